//! Conversion between script values and [`DynamicValue`]

use super::function::ScriptFunction;
use super::value::DynamicValue;
use boa_engine::object::builtins::{JsArray, JsFunction};
use boa_engine::value::JsVariant;
use boa_engine::{js_string, Context, JsObject, JsResult, JsString, JsValue};
use std::collections::HashMap;

/// Convert a script value to its native form.
///
/// Never fails: anything that cannot be converted (a string that is not
/// valid UTF-16, a BigInt, a Symbol, a throwing getter) becomes
/// [`DynamicValue::Void`]. A reference back to an object that is already
/// being converted becomes [`DynamicValue::Undefined`].
pub fn to_native(value: &JsValue, context: &mut Context) -> DynamicValue {
    let mut ancestors = Vec::new();
    convert(value, context, &mut ancestors)
}

/// Convert a native value to a new script value
pub fn to_script(value: &DynamicValue, context: &mut Context) -> JsValue {
    match value {
        DynamicValue::Void => JsValue::null(),
        DynamicValue::Undefined => JsValue::undefined(),
        DynamicValue::Bool(b) => JsValue::from(*b),
        DynamicValue::Int(n) => int64_to_script(*n),
        DynamicValue::Double(n) => JsValue::from(*n),
        DynamicValue::String(s) => JsValue::from(JsString::from(s.as_str())),
        DynamicValue::Array(items) => {
            let items: Vec<JsValue> = items.iter().map(|item| to_script(item, context)).collect();
            JsArray::from_iter(items, context).into()
        }
        DynamicValue::Object(map) => {
            let object = JsObject::with_object_proto(context.intrinsics());
            for (key, item) in map {
                let item = to_script(item, context);
                if let Err(err) = object.create_data_property_or_throw(JsString::from(key.as_str()), item, context) {
                    log::debug!("dropping property `{key}` during conversion: {err}");
                }
            }
            object.into()
        }
        DynamicValue::Function(function) => function.to_js_value(),
    }
}

/// 64-bit integers that fit in 32 bits keep the integer tag; wider ones
/// become doubles.
pub(crate) fn int64_to_script(n: i64) -> JsValue {
    match i32::try_from(n) {
        Ok(small) => JsValue::from(small),
        Err(_) => JsValue::from(n as f64),
    }
}

fn convert(value: &JsValue, context: &mut Context, ancestors: &mut Vec<JsObject>) -> DynamicValue {
    match value.variant() {
        JsVariant::Null => DynamicValue::Void,
        JsVariant::Undefined => DynamicValue::Undefined,
        JsVariant::Boolean(b) => DynamicValue::Bool(b),
        JsVariant::Integer32(n) => DynamicValue::Int(i64::from(n)),
        JsVariant::Float64(n) => DynamicValue::Double(n),
        JsVariant::String(s) => s
            .to_std_string()
            .map(DynamicValue::String)
            .unwrap_or(DynamicValue::Void),
        JsVariant::BigInt(_) | JsVariant::Symbol(_) => DynamicValue::Void,
        JsVariant::Object(object) => convert_object(object.clone(), context, ancestors),
    }
}

fn convert_object(
    object: JsObject,
    context: &mut Context,
    ancestors: &mut Vec<JsObject>,
) -> DynamicValue {
    if object.is_callable() {
        return match JsFunction::from_object(object) {
            Some(function) => DynamicValue::Function(ScriptFunction::new(function)),
            None => DynamicValue::Void,
        };
    }

    if ancestors.iter().any(|seen| JsObject::equals(seen, &object)) {
        log::debug!("cyclic reference found while converting script object");
        return DynamicValue::Undefined;
    }

    ancestors.push(object.clone());
    let converted = if object.is_array() {
        convert_array(&object, context, ancestors)
    } else {
        convert_map(&object, context, ancestors)
    };
    ancestors.pop();

    converted
}

fn convert_array(
    array: &JsObject,
    context: &mut Context,
    ancestors: &mut Vec<JsObject>,
) -> DynamicValue {
    let length = match array
        .get(js_string!("length"), context)
        .and_then(|len| len.to_length(context))
    {
        Ok(length) => length,
        Err(_) => return DynamicValue::Void,
    };

    let mut items = Vec::with_capacity(length.min(4096) as usize);
    for index in 0..length {
        let item = match array.get(index, context) {
            Ok(item) => convert(&item, context, ancestors),
            Err(_) => DynamicValue::Void,
        };
        items.push(item);
    }
    DynamicValue::Array(items)
}

fn convert_map(
    object: &JsObject,
    context: &mut Context,
    ancestors: &mut Vec<JsObject>,
) -> DynamicValue {
    let keys = match own_enumerable_keys(object, context) {
        Ok(keys) => keys,
        Err(_) => return DynamicValue::Void,
    };

    let mut map = HashMap::with_capacity(keys.len());
    for key in keys {
        let item = match object.get(key.clone(), context) {
            Ok(item) => convert(&item, context, ancestors),
            Err(_) => DynamicValue::Void,
        };
        if let Ok(key) = key.to_std_string() {
            map.insert(key, item);
        }
    }
    DynamicValue::Object(map)
}

/// Own enumerable string keys, in the order `Object.keys` reports them
fn own_enumerable_keys(object: &JsObject, context: &mut Context) -> JsResult<Vec<JsString>> {
    let object_ctor = context.intrinsics().constructors().object().constructor();
    let keys_fn = object_ctor.get(js_string!("keys"), context)?;
    let Some(keys_fn) = keys_fn.as_object().and_then(|f| JsFunction::from_object(f.clone())) else {
        return Ok(Vec::new());
    };

    let keys = keys_fn.call(
        &JsValue::undefined(),
        &[JsValue::from(object.clone())],
        context,
    )?;
    let Some(keys) = keys.as_object().map(|k| k.clone()) else {
        return Ok(Vec::new());
    };

    let length = keys.get(js_string!("length"), context)?.to_length(context)?;
    let mut out = Vec::with_capacity(length as usize);
    for index in 0..length {
        let key = keys.get(index, context)?;
        out.push(key.to_string(context)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;
    use pretty_assertions::assert_eq;

    fn eval(context: &mut Context, code: &str) -> DynamicValue {
        let value = context.eval(Source::from_bytes(code)).unwrap();
        to_native(&value, context)
    }

    #[test]
    fn test_scalars() {
        let mut context = Context::default();
        assert_eq!(eval(&mut context, "null"), DynamicValue::Void);
        assert_eq!(eval(&mut context, "undefined"), DynamicValue::Undefined);
        assert_eq!(eval(&mut context, "true"), DynamicValue::Bool(true));
        assert_eq!(eval(&mut context, "1 + 1"), DynamicValue::Int(2));
        assert_eq!(eval(&mut context, "3.5"), DynamicValue::Double(3.5));
        assert_eq!(eval(&mut context, "'héllo'"), DynamicValue::from("héllo"));
    }

    #[test]
    fn test_unsupported_values_become_void() {
        let mut context = Context::default();
        assert_eq!(eval(&mut context, "Symbol('s')"), DynamicValue::Void);
        assert_eq!(eval(&mut context, "10n"), DynamicValue::Void);
    }

    #[test]
    fn test_nested_structures() {
        let mut context = Context::default();
        let value = eval(&mut context, "({ list: [1, 'two', [3]], flag: false })");

        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["flag"], DynamicValue::Bool(false));
        assert_eq!(
            map["list"],
            DynamicValue::Array(vec![
                DynamicValue::Int(1),
                DynamicValue::from("two"),
                DynamicValue::Array(vec![DynamicValue::Int(3)]),
            ])
        );
    }

    #[test]
    fn test_non_enumerable_and_inherited_keys_are_skipped() {
        let mut context = Context::default();
        let value = eval(
            &mut context,
            "var o = Object.create({ inherited: 1 }); \
             Object.defineProperty(o, 'hidden', { value: 2, enumerable: false }); \
             o.shown = 3; o",
        );
        let map = value.as_object().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["shown"]);
    }

    #[test]
    fn test_functions_are_wrapped() {
        let mut context = Context::default();
        let value = eval(&mut context, "(function () { return 7; })");
        let function = value.as_function().unwrap();
        assert_eq!(function.call(&[], &mut context).unwrap(), DynamicValue::Int(7));
    }

    #[test]
    fn test_cycles_terminate() {
        let mut context = Context::default();
        let value = eval(&mut context, "var a = { name: 'a' }; a.self = a; a");
        let map = value.as_object().unwrap();
        assert_eq!(map["name"], DynamicValue::from("a"));
        assert_eq!(map["self"], DynamicValue::Undefined);
    }

    #[test]
    fn test_shared_children_are_not_cycles() {
        let mut context = Context::default();
        let value = eval(&mut context, "var c = [1]; [c, c]");
        assert_eq!(
            value,
            DynamicValue::Array(vec![
                DynamicValue::Array(vec![DynamicValue::Int(1)]),
                DynamicValue::Array(vec![DynamicValue::Int(1)]),
            ])
        );
    }

    #[test]
    fn test_to_script_builds_objects() {
        let mut context = Context::default();
        let mut map = HashMap::new();
        map.insert("n".to_string(), DynamicValue::Int(5));
        map.insert("s".to_string(), DynamicValue::from("x"));
        let value = to_script(&DynamicValue::Object(map), &mut context);

        context
            .register_global_property(js_string!("probe"), value, boa_engine::property::Attribute::all())
            .unwrap();
        assert_eq!(eval(&mut context, "probe.n * 2"), DynamicValue::Int(10));
        assert_eq!(eval(&mut context, "typeof probe.s"), DynamicValue::from("string"));
    }

    #[test]
    fn test_wide_integers_become_doubles() {
        let mut context = Context::default();
        let wide = i64::from(i32::MAX) + 1;
        let value = int64_to_script(wide);
        assert!(value.is_number());
        assert_eq!(to_native(&value, &mut context), DynamicValue::Int(wide));
        assert!(to_script(&DynamicValue::Void, &mut context).is_null());
    }
}
