//! Scoped script value

use super::marshal;
use super::value::DynamicValue;
use boa_engine::value::JsVariant;
use boa_engine::{Context, JsError, JsObject, JsString, JsValue};

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    Value(JsValue),
    /// Sentinel returned by a failed evaluation; the error itself is
    /// pending on the context.
    Exception,
}

/// Owns one reference to a script value.
///
/// Clones hold their own reference; dropping, [`reset`](Self::reset) or
/// overwriting releases it. A value obtained from a [`ScriptContext`] is
/// bound to it; scalar assignment to an unbound value is ignored.
///
/// [`ScriptContext`]: super::context::ScriptContext
#[derive(Debug, Clone, Default)]
pub struct Value {
    slot: Slot,
    bound: bool,
}

/// Native scalars that can be assigned to a [`Value`]
pub trait ScriptScalar {
    fn into_script(self) -> JsValue;
}

impl ScriptScalar for i32 {
    fn into_script(self) -> JsValue {
        JsValue::from(self)
    }
}

impl ScriptScalar for i64 {
    fn into_script(self) -> JsValue {
        marshal::int64_to_script(self)
    }
}

impl ScriptScalar for bool {
    fn into_script(self) -> JsValue {
        JsValue::from(self)
    }
}

impl ScriptScalar for f32 {
    fn into_script(self) -> JsValue {
        JsValue::from(f64::from(self))
    }
}

impl ScriptScalar for f64 {
    fn into_script(self) -> JsValue {
        JsValue::from(self)
    }
}

impl ScriptScalar for &str {
    fn into_script(self) -> JsValue {
        JsValue::from(JsString::from(self))
    }
}

impl ScriptScalar for String {
    fn into_script(self) -> JsValue {
        JsValue::from(JsString::from(self.as_str()))
    }
}

impl Value {
    /// Wrap an engine value, taking ownership of the reference
    pub fn from_js(value: JsValue) -> Self {
        Self {
            slot: Slot::Value(value),
            bound: true,
        }
    }

    pub(crate) fn bound() -> Self {
        Self {
            slot: Slot::Empty,
            bound: true,
        }
    }

    pub(crate) fn exception() -> Self {
        Self {
            slot: Slot::Exception,
            bound: true,
        }
    }

    /// Replace the held value with a fresh scalar. No-op when unbound.
    pub fn assign<T: ScriptScalar>(&mut self, scalar: T) -> &mut Self {
        if self.bound {
            self.slot = Slot::Value(scalar.into_script());
        }
        self
    }

    /// Release the held reference. Idempotent.
    pub fn reset(&mut self) {
        self.slot = Slot::Empty;
    }

    /// Hand the raw value to the caller and leave this instance empty
    pub fn release(&mut self) -> Option<JsValue> {
        match std::mem::take(&mut self.slot) {
            Slot::Value(value) => Some(value),
            Slot::Empty | Slot::Exception => None,
        }
    }

    /// Move the contents out, leaving this instance empty
    pub fn take(&mut self) -> Value {
        Value {
            slot: std::mem::take(&mut self.slot),
            bound: self.bound,
        }
    }

    pub fn as_js(&self) -> Option<&JsValue> {
        match &self.slot {
            Slot::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The held value, `undefined` when empty
    pub fn to_js(&self) -> JsValue {
        self.as_js().cloned().unwrap_or_default()
    }

    fn object(&self) -> Option<JsObject> {
        self.as_js()?.as_object().map(|o| o.clone())
    }

    pub fn is_void(&self) -> bool {
        matches!(self.slot, Slot::Empty)
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.slot, Slot::Exception)
    }

    pub fn is_undefined(&self) -> bool {
        self.as_js().is_some_and(JsValue::is_undefined)
    }

    pub fn is_null(&self) -> bool {
        self.as_js().is_some_and(JsValue::is_null)
    }

    pub fn is_int(&self) -> bool {
        self.as_js()
            .is_some_and(|v| matches!(v.variant(), JsVariant::Integer32(_)))
    }

    pub fn is_double(&self) -> bool {
        self.as_js()
            .is_some_and(|v| matches!(v.variant(), JsVariant::Float64(_)))
    }

    pub fn is_bool(&self) -> bool {
        self.as_js().is_some_and(JsValue::is_boolean)
    }

    pub fn is_string(&self) -> bool {
        self.as_js().is_some_and(JsValue::is_string)
    }

    pub fn is_array(&self) -> bool {
        self.object().is_some_and(|o| o.is_array())
    }

    pub fn is_function(&self) -> bool {
        self.as_js().is_some_and(JsValue::is_callable)
    }

    /// Plain objects only: arrays and functions are excluded
    pub fn is_object(&self) -> bool {
        self.object()
            .is_some_and(|o| !o.is_array() && !o.is_callable())
    }

    /// Whether the value is an `Error` instance
    pub fn is_error(&self, context: &mut Context) -> bool {
        match self.object() {
            Some(object) => JsError::from_opaque(object.into()).try_native(context).is_ok(),
            None => false,
        }
    }

    pub fn to_i32(&self) -> i32 {
        match self.as_js().map(JsValue::variant) {
            Some(JsVariant::Integer32(n)) => n,
            Some(JsVariant::Float64(n)) if n.is_finite() => n as i32,
            _ => 0,
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self.as_js().map(JsValue::variant) {
            Some(JsVariant::Integer32(n)) => i64::from(n),
            Some(JsVariant::Float64(n)) if n.is_finite() => n as i64,
            _ => 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.as_js().and_then(JsValue::as_number).unwrap_or(0.0)
    }

    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    /// Script truthiness; empty and exception values are false
    pub fn to_bool(&self) -> bool {
        self.as_js().is_some_and(JsValue::to_boolean)
    }

    /// String contents, or an empty string for non-strings
    pub fn to_string_lossy(&self) -> String {
        self.as_js()
            .and_then(|v| v.as_string().map(|s| s.to_std_string_lossy()))
            .unwrap_or_default()
    }

    /// Element `index` of an array; empty for non-arrays and negative
    /// indices, `undefined` past the end.
    pub fn at(&self, index: i64, context: &mut Context) -> Value {
        let Some(array) = self.object().filter(|o| o.is_array()) else {
            return self.empty_like();
        };
        let Ok(index) = u32::try_from(index) else {
            return self.empty_like();
        };
        match array.get(index, context) {
            Ok(item) => Value::from_js(item),
            Err(_) => self.empty_like(),
        }
    }

    /// Property of a plain object; empty for anything else
    pub fn get_property(&self, name: &str, context: &mut Context) -> Value {
        if !self.is_object() {
            return self.empty_like();
        }
        match self.object().map(|o| o.get(JsString::from(name), context)) {
            Some(Ok(item)) => Value::from_js(item),
            _ => self.empty_like(),
        }
    }

    /// Set a property of a plain object; silently ignored otherwise
    pub fn set_property(&self, name: &str, value: &Value, context: &mut Context) {
        if !self.is_object() {
            return;
        }
        if let Some(object) = self.object() {
            if let Err(err) = object.set(JsString::from(name), value.to_js(), false, context) {
                log::debug!("setting `{name}` failed: {err}");
            }
        }
    }

    /// Convert through the marshaler
    pub fn to_dynamic(&self, context: &mut Context) -> DynamicValue {
        match &self.slot {
            Slot::Value(value) => marshal::to_native(value, context),
            Slot::Empty | Slot::Exception => DynamicValue::Void,
        }
    }

    fn empty_like(&self) -> Value {
        Value {
            slot: Slot::Empty,
            bound: self.bound,
        }
    }
}

impl From<JsValue> for Value {
    fn from(value: JsValue) -> Self {
        Self::from_js(value)
    }
}
