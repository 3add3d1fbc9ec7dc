//! Script-visible classes backed by native types

use boa_engine::native_function::NativeFunctionPointer;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::object::builtins::JsFunction;
use boa_engine::property::{Attribute, PropertyDescriptor};
use boa_engine::{Context, JsObject, JsResult, JsString, NativeFunction, js_string};
use std::fmt;

/// A native type that can be exposed to scripts.
///
/// `declare` runs once per script context and fills in the prototype.
/// Method and accessor implementations resolve their receiver with
/// [`Object::get_native_object`](super::object::Object::get_native_object)
/// and return `null` when it is gone.
pub trait Scriptable: Sized + 'static {
    /// Class name, also the global name of the constructor if one is declared
    const NAME: &'static str;

    fn declare(class: &mut ClassBuilder<'_>) -> JsResult<()>;
}

/// Runtime-wide identifier of a registered class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Registration record kept by the runtime for each native type
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub id: ClassId,
    pub name: &'static str,
}

/// Builds the prototype of one class in one context.
///
/// Properties are accessors: a getter is required and marks the property
/// enumerable; without a setter, assignments are ignored (or throw in strict
/// code). Every declared member is configurable.
pub struct ClassBuilder<'ctx> {
    context: &'ctx mut Context,
    name: &'static str,
    prototype: JsObject,
    constructor: Option<JsFunction>,
}

impl<'ctx> ClassBuilder<'ctx> {
    pub(crate) fn new(name: &'static str, context: &'ctx mut Context) -> Self {
        let prototype = JsObject::with_object_proto(context.intrinsics());
        Self {
            context,
            name,
            prototype,
            constructor: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn context(&mut self) -> &mut Context {
        self.context
    }

    /// Declare a method on the prototype
    pub fn method(
        &mut self,
        name: &str,
        length: usize,
        function: NativeFunctionPointer,
    ) -> JsResult<&mut Self> {
        let function = self.function(JsString::from(name), length, function, false);
        self.prototype.define_property_or_throw(
            JsString::from(name),
            PropertyDescriptor::builder()
                .value(function)
                .writable(true)
                .enumerable(false)
                .configurable(true),
            self.context,
        )?;
        Ok(self)
    }

    /// Declare an accessor property
    pub fn property(
        &mut self,
        name: &str,
        getter: NativeFunctionPointer,
        setter: Option<NativeFunctionPointer>,
    ) -> JsResult<&mut Self> {
        let get = self.function(JsString::from(format!("get {name}").as_str()), 0, getter, false);
        let mut descriptor = PropertyDescriptor::builder()
            .get(get)
            .enumerable(true)
            .configurable(true);
        if let Some(setter) = setter {
            let set = self.function(JsString::from(format!("set {name}").as_str()), 1, setter, false);
            descriptor = descriptor.set(set);
        }
        self.prototype
            .define_property_or_throw(JsString::from(name), descriptor, self.context)?;
        Ok(self)
    }

    /// Declare the constructor and expose it as a global
    pub fn constructor(
        &mut self,
        length: usize,
        function: NativeFunctionPointer,
    ) -> JsResult<&mut Self> {
        let constructor = self.function(JsString::from(self.name), length, function, true);

        constructor.define_property_or_throw(
            js_string!("prototype"),
            PropertyDescriptor::builder()
                .value(self.prototype.clone())
                .writable(false)
                .enumerable(false)
                .configurable(false),
            self.context,
        )?;
        self.prototype.define_property_or_throw(
            js_string!("constructor"),
            PropertyDescriptor::builder()
                .value(constructor.clone())
                .writable(true)
                .enumerable(false)
                .configurable(true),
            self.context,
        )?;
        self.context.register_global_property(
            JsString::from(self.name),
            constructor.clone(),
            Attribute::WRITABLE | Attribute::CONFIGURABLE,
        )?;

        self.constructor = Some(constructor);
        Ok(self)
    }

    fn function(
        &mut self,
        name: JsString,
        length: usize,
        function: NativeFunctionPointer,
        constructor: bool,
    ) -> JsFunction {
        FunctionObjectBuilder::new(self.context.realm(), NativeFunction::from_fn_ptr(function))
            .name(name)
            .length(length)
            .constructor(constructor)
            .build()
    }

    pub(crate) fn build(self) -> (JsObject, Option<JsFunction>) {
        (self.prototype, self.constructor)
    }
}
