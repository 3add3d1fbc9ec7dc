//! Script context: one evaluation context plus its timer pool

use super::class::{ClassBuilder, ClassId, Scriptable};
use super::globals;
use super::runtime::Runtime;
use super::scoped::{ScriptScalar, Value};
use super::timers::{self, TimerPool};
use super::value::DynamicValue;
use crate::devtools::console::{Console, LogLevel};
use crate::utils::error::{Result, ScriptError};
use boa_engine::builtins::promise::PromiseState;
use boa_engine::module::Module;
use boa_engine::property::PropertyDescriptor;
use boa_engine::{
    Context, JsData, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Source,
    js_string,
};
use boa_gc::{Finalize, Trace, empty_trace};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// Global under which every context stores a pointer to its own state
pub const CONTEXT_GLOBAL: &str = "__context__";

/// Direct `eval` inside a function so `this` is the receiver. Declarations
/// made by the evaluated code stay local to the call.
const EVALUATE_THIS_WRAPPER: &str = "(function () { return eval(arguments[0]); })";

/// Per-context host state reachable from native callbacks
pub(crate) struct ContextState {
    timers: RefCell<TimerPool<Context>>,
    prototypes: RefCell<HashMap<TypeId, JsObject>>,
    pending_exception: RefCell<Option<JsError>>,
    console: Rc<RefCell<Console>>,
}

impl ContextState {
    fn new(console: Rc<RefCell<Console>>) -> Self {
        Self {
            timers: RefCell::new(TimerPool::new()),
            prototypes: RefCell::new(HashMap::new()),
            pending_exception: RefCell::new(None),
            console,
        }
    }

    /// State of the context `context` belongs to
    pub(crate) fn current(context: &mut Context) -> Option<Rc<ContextState>> {
        get_global_native::<ContextState>(context, CONTEXT_GLOBAL)
    }

    pub(crate) fn schedule<F>(&self, delay: Duration, callback: F) -> bool
    where
        F: FnOnce(&mut Context) + 'static,
    {
        match self.timers.try_borrow_mut() {
            Ok(mut timers) => {
                timers.call_after_delay(delay, callback);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.try_borrow().map(|t| t.len()).unwrap_or(0)
    }

    fn clear_timers(&self) {
        if let Ok(mut timers) = self.timers.try_borrow_mut() {
            timers.clear();
        }
    }

    pub(crate) fn console_line(&self, level: LogLevel, line: String) {
        if let Ok(mut console) = self.console.try_borrow_mut() {
            console.push(level, line);
        }
    }

    pub(crate) fn record_exception(&self, error: JsError) {
        if let Ok(mut pending) = self.pending_exception.try_borrow_mut() {
            *pending = Some(error);
        }
    }

    fn take_exception(&self) -> Option<JsError> {
        self.pending_exception.try_borrow_mut().ok()?.take()
    }

    fn prototype(&self, type_id: TypeId) -> Option<JsObject> {
        self.prototypes.try_borrow().ok()?.get(&type_id).cloned()
    }
}

/// Prototype of class `T` in the context `context` belongs to
pub(crate) fn prototype_for<T: 'static>(context: &mut Context) -> JsResult<JsObject> {
    let state = ContextState::current(context).ok_or_else(|| {
        JsNativeError::typ().with_message("context is not managed by a ScriptContext")
    })?;
    state.prototype(TypeId::of::<T>()).ok_or_else(|| {
        JsNativeError::typ()
            .with_message(format!(
                "class {} is not registered in this context",
                std::any::type_name::<T>()
            ))
            .into()
    })
}

/// Opaque payload of a plain global object pointing at host state. Weak so
/// that the global does not keep its owner alive.
#[derive(Finalize, JsData)]
struct GlobalNative {
    target: Weak<dyn Any>,
}

// SAFETY: holds no garbage-collected pointers.
unsafe impl Trace for GlobalNative {
    empty_trace!();
}

/// Store a host pointer under a global name
pub fn set_global_native<T: Any>(context: &mut Context, name: &str, target: &Rc<T>) -> JsResult<()> {
    let target: Weak<dyn Any> = Rc::downgrade(target) as Weak<dyn Any>;
    let holder = JsObject::from_proto_and_data(None, GlobalNative { target });
    context.global_object().define_property_or_throw(
        JsString::from(name),
        PropertyDescriptor::builder()
            .value(holder)
            .writable(false)
            .enumerable(false)
            .configurable(true),
        context,
    )?;
    Ok(())
}

/// Retrieve a host pointer stored with [`set_global_native`]
pub fn get_global_native<T: Any>(context: &mut Context, name: &str) -> Option<Rc<T>> {
    let holder = context
        .global_object()
        .get(JsString::from(name), context)
        .ok()?;
    let holder = holder.as_object()?.clone();
    let native = holder.downcast_ref::<GlobalNative>()?;
    let target = native.target.upgrade()?;
    target.downcast::<T>().ok()
}

/// Owns one evaluation context, its timer pool and its console.
///
/// Not thread-safe; every call must come from the thread that created it.
pub struct ScriptContext {
    runtime: Rc<Runtime>,
    state: Rc<ContextState>,
    context: Context,
    console: Rc<RefCell<Console>>,
}

impl ScriptContext {
    pub fn new(runtime: Rc<Runtime>) -> Result<Self> {
        let console = Rc::new(RefCell::new(Console::with_capacity(
            runtime.config().console_capacity,
        )));
        let context = runtime.build_context()?;
        let state = Rc::new(ContextState::new(console.clone()));

        let mut script = Self {
            runtime,
            state,
            context,
            console,
        };
        script.install_globals()?;
        Ok(script)
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    /// The underlying engine context
    pub fn js_context(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn console(&self) -> Rc<RefCell<Console>> {
        self.console.clone()
    }

    fn install_globals(&mut self) -> Result<()> {
        set_global_native(&mut self.context, CONTEXT_GLOBAL, &self.state)
            .and_then(|()| globals::install(&mut self.context))
            .map_err(|err| ScriptError::Context(err.to_string()).into())
    }

    /// Drop all script state and start over with a fresh context.
    ///
    /// Pending timers are dropped first, without firing. Registered classes
    /// keep their ids but must be registered again to get prototypes.
    pub fn reset(&mut self) -> Result<()> {
        self.state.clear_timers();
        let context = self.runtime.build_context()?;
        self.context = context;
        self.state = Rc::new(ContextState::new(self.console.clone()));
        self.install_globals()?;
        log::debug!("script context reset");
        Ok(())
    }

    /// Register `T` with the runtime and build its prototype here
    pub fn register_class<T: Scriptable>(&mut self) -> Result<ClassId> {
        let id = self.runtime.register_class::<T>();
        let mut builder = ClassBuilder::new(T::NAME, &mut self.context);
        T::declare(&mut builder).map_err(|err| ScriptError::Class {
            name: T::NAME,
            message: err.to_string(),
        })?;
        let (prototype, _constructor) = builder.build();
        self.state
            .prototypes
            .borrow_mut()
            .insert(TypeId::of::<T>(), prototype);
        Ok(id)
    }

    /// An empty value bound to this context
    pub fn make_value(&self) -> Value {
        Value::bound()
    }

    pub fn make_value_from<T: ScriptScalar>(&self, scalar: T) -> Value {
        let mut value = Value::bound();
        value.assign(scalar);
        value
    }

    pub fn global_object(&self) -> Value {
        Value::from_js(self.context.global_object().into())
    }

    /// Define or overwrite a global binding
    pub fn set_global(&mut self, name: &str, value: JsValue) -> Result<()> {
        let global = self.context.global_object();
        global
            .set(JsString::from(name), value, true, &mut self.context)
            .map(|_| ())
            .map_err(|err| ScriptError::Execution(err.to_string()).into())
    }

    /// Evaluate `script` as a module when it starts with `import`/`export`,
    /// as a global script otherwise. Returns the exception sentinel on
    /// failure and keeps the error pending for [`dump_error`](Self::dump_error).
    pub fn evaluate(&mut self, script: &str, file_name: &str) -> Value {
        let result = if is_module_source(script) {
            self.evaluate_module(script, file_name)
        } else {
            let source = Source::from_bytes(script).with_path(Path::new(file_name));
            self.context.eval(source)
        };
        self.finish(result)
    }

    /// Evaluate global-form `script` with `this` bound to `this`
    pub fn evaluate_this(&mut self, this: &Value, script: &str, file_name: &str) -> Value {
        let source = Source::from_bytes(EVALUATE_THIS_WRAPPER).with_path(Path::new(file_name));
        let result = self.context.eval(source).and_then(|wrapper| {
            let wrapper = super::function::as_function(&wrapper).ok_or_else(|| {
                JsError::from(JsNativeError::typ().with_message("evaluation wrapper is not callable"))
            })?;
            wrapper.call(
                &this.to_js(),
                &[JsValue::from(JsString::from(script))],
                &mut self.context,
            )
        });
        self.finish(result)
    }

    fn evaluate_module(&mut self, script: &str, file_name: &str) -> JsResult<JsValue> {
        let source = Source::from_bytes(script).with_path(Path::new(file_name));
        let module = Module::parse(source, None, &mut self.context)?;
        let promise = module.load_link_evaluate(&mut self.context);
        self.run_jobs();

        match promise.state() {
            PromiseState::Fulfilled(_) => Ok(JsValue::undefined()),
            PromiseState::Rejected(reason) => Err(JsError::from_opaque(reason.clone())),
            PromiseState::Pending => {
                log::debug!("module {file_name} is still pending after the job queue drained");
                Ok(JsValue::undefined())
            }
        }
    }

    /// Drain the job queue; a failing job becomes the pending exception
    fn run_jobs(&mut self) {
        if let Err(error) = self.context.run_jobs() {
            log::warn!("job queue failed: {error}");
            self.state.record_exception(error);
        }
    }

    fn finish(&mut self, result: JsResult<JsValue>) -> Value {
        self.run_jobs();
        match result {
            Ok(value) => Value::from_js(value),
            Err(error) => {
                self.state.record_exception(error);
                Value::exception()
            }
        }
    }

    /// Evaluate and marshal the result, turning the sentinel into an error
    pub fn execute(&mut self, script: &str) -> Result<DynamicValue> {
        let value = self.evaluate(script, "<execute>");
        if value.is_exception() {
            let message = self
                .take_exception_message()
                .unwrap_or_else(|| "unknown exception".to_string());
            return Err(ScriptError::Execution(message).into());
        }
        Ok(value.to_dynamic(&mut self.context))
    }

    pub fn has_pending_exception(&self) -> bool {
        self.state
            .pending_exception
            .try_borrow()
            .is_ok_and(|pending| pending.is_some())
    }

    /// Take the pending exception, leaving none
    pub fn take_exception(&mut self) -> Option<JsError> {
        self.state.take_exception()
    }

    /// Log the pending exception (message, then stack when present) and
    /// return the report. Clears it.
    pub fn dump_error(&mut self) -> Option<String> {
        let report = self.take_exception_message()?;
        log::error!("{report}");
        if let Ok(mut console) = self.console.try_borrow_mut() {
            console.push(LogLevel::Error, report.clone());
        }
        Some(report)
    }

    fn take_exception_message(&mut self) -> Option<String> {
        let error = self.state.take_exception()?;
        let thrown = error.to_opaque(&mut self.context);

        let mut report = match thrown.to_string(&mut self.context) {
            Ok(message) => message.to_std_string_escaped(),
            Err(_) => error.to_string(),
        };

        if let Some(object) = thrown.as_object() {
            if let Ok(stack) = object.get(js_string!("stack"), &mut self.context) {
                if let Some(stack) = stack.as_string() {
                    let stack = stack.to_std_string_escaped();
                    if !stack.is_empty() {
                        report.push('\n');
                        report.push_str(&stack);
                    }
                }
            }
        }
        Some(report)
    }

    /// Run `callback` once, `delay_ms` from now
    pub fn call_after_delay<F>(&self, delay_ms: u64, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.state
            .schedule(Duration::from_millis(delay_ms), move |_| callback());
    }

    /// Fire every due timer. Returns how many ran.
    pub fn run_timers(&mut self) -> usize {
        let state = Rc::clone(&self.state);
        let fired = timers::fire_due(&state.timers, &mut self.context, Instant::now());
        if fired > 0 {
            self.run_jobs();
        }
        fired
    }

    pub fn pending_timers(&self) -> usize {
        self.state.pending_timers()
    }

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.state
            .timers
            .try_borrow()
            .ok()
            .and_then(|timers| timers.next_deadline())
    }

    /// Sleep and fire timers until the pool is empty
    pub async fn run_until_idle(&mut self) {
        loop {
            self.run_timers();
            let Some(deadline) = self.next_timer_deadline() else {
                break;
            };
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
    }
}

impl Drop for ScriptContext {
    fn drop(&mut self) {
        self.state.clear_timers();
    }
}

/// Whether `source` is an ES module: its first token is `export`, or
/// `import` that is not a dynamic `import(` or `import.meta`.
pub fn is_module_source(source: &str) -> bool {
    let rest = skip_trivia(source);
    if starts_with_word(rest, "export") {
        return true;
    }
    if starts_with_word(rest, "import") {
        let after = skip_trivia(&rest["import".len()..]);
        return !(after.starts_with('(') || after.starts_with('.'));
    }
    false
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.starts_with(word)
        && !text[word.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn skip_trivia(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim_start();
        if let Some(rest) = trimmed.strip_prefix("//") {
            text = rest.find('\n').map_or("", |end| &rest[end..]);
        } else if let Some(rest) = trimmed.strip_prefix("/*") {
            text = rest.find("*/").map_or("", |end| &rest[end + 2..]);
        } else {
            return trimmed;
        }
    }
}
