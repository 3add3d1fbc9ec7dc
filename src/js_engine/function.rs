//! Handle to a script-side callable

use super::marshal;
use super::value::DynamicValue;
use boa_engine::object::builtins::JsFunction;
use boa_engine::{Context, JsObject, JsResult, JsValue};
use std::fmt;
use std::rc::Rc;

/// Reference-counted handle to one script callable.
///
/// Clones share the same underlying reference; it is released once, when the
/// last clone is dropped.
#[derive(Clone)]
pub struct ScriptFunction {
    inner: Rc<JsFunction>,
}

impl ScriptFunction {
    pub fn new(function: JsFunction) -> Self {
        Self {
            inner: Rc::new(function),
        }
    }

    /// Wrap a script value, returning `None` when it is not callable
    pub fn from_value(value: &JsValue) -> Option<Self> {
        as_function(value).map(Self::new)
    }

    /// Call with the global object as receiver
    pub fn call(&self, args: &[DynamicValue], context: &mut Context) -> JsResult<DynamicValue> {
        self.call_this(&JsValue::undefined(), args, context)
    }

    /// Call with an explicit receiver. Arguments and the result go through
    /// the marshaler; a thrown exception is returned as `Err`.
    pub fn call_this(
        &self,
        this: &JsValue,
        args: &[DynamicValue],
        context: &mut Context,
    ) -> JsResult<DynamicValue> {
        let args: Vec<JsValue> = args
            .iter()
            .map(|arg| marshal::to_script(arg, context))
            .collect();
        let result = self.inner.call(this, &args, context)?;
        Ok(marshal::to_native(&result, context))
    }

    /// Call without marshaling
    pub fn call_raw(
        &self,
        this: &JsValue,
        args: &[JsValue],
        context: &mut Context,
    ) -> JsResult<JsValue> {
        self.inner.call(this, args, context)
    }

    pub fn js_function(&self) -> &JsFunction {
        &self.inner
    }

    /// The script value for this callable (same identity, new reference)
    pub fn to_js_value(&self) -> JsValue {
        JsValue::from(self.inner.as_ref().clone())
    }

    /// Number of live handles sharing this reference
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl PartialEq for ScriptFunction {
    fn eq(&self, other: &Self) -> bool {
        let lhs: &JsObject = &self.inner;
        let rhs: &JsObject = &other.inner;
        JsObject::equals(lhs, rhs)
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

/// Extract a callable from a script value
pub(crate) fn as_function(value: &JsValue) -> Option<JsFunction> {
    let object = value.as_object()?;
    JsFunction::from_object(object.clone())
}
