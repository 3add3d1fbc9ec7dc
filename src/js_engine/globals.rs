//! Globals installed in every script context: `console` and `setTimeout`

use super::context::ContextState;
use super::function::{ScriptFunction, as_function};
use crate::devtools::console::LogLevel;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::value::JsVariant;
use boa_engine::{Context, JsNativeError, JsResult, JsValue, NativeFunction, js_string};
use std::rc::Rc;
use std::time::Duration;

pub(crate) fn install(context: &mut Context) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::all())?;

    context.register_global_callable(
        js_string!("setTimeout"),
        2,
        NativeFunction::from_fn_ptr(set_timeout),
    )?;
    Ok(())
}

/// Join the arguments with single spaces, each coerced to a string
fn format_line(args: &[JsValue], context: &mut Context) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(arg.to_string(context)?.to_std_string_escaped());
    }
    Ok(parts.join(" "))
}

fn emit(level: LogLevel, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let line = format_line(args, context)?;
    match level {
        LogLevel::Error => log::error!(target: "console", "{line}"),
        LogLevel::Warn => log::warn!(target: "console", "{line}"),
        LogLevel::Log => log::info!(target: "console", "{line}"),
    }
    if let Some(state) = ContextState::current(context) {
        state.console_line(level, line);
    }
    Ok(JsValue::undefined())
}

fn console_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    emit(LogLevel::Log, args, context)
}

fn console_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    emit(LogLevel::Warn, args, context)
}

fn console_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    emit(LogLevel::Error, args, context)
}

/// `setTimeout(fn, delay)`: exactly two arguments, a callable and an
/// integer-tagged delay. No handle is returned and nothing can cancel it.
fn set_timeout(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let [callback, delay] = args else {
        return Err(JsNativeError::typ()
            .with_message("setTimeout expects exactly 2 arguments")
            .into());
    };
    let Some(callback) = as_function(callback) else {
        return Err(JsNativeError::typ()
            .with_message("setTimeout: first argument must be a function")
            .into());
    };
    let JsVariant::Integer32(delay) = delay.variant() else {
        return Err(JsNativeError::typ()
            .with_message("setTimeout: delay must be an integer")
            .into());
    };

    let state = ContextState::current(context).ok_or_else(|| {
        JsNativeError::typ().with_message("setTimeout: no script context")
    })?;

    let callback = ScriptFunction::new(callback);
    let owner = Rc::downgrade(&state);
    let delay = Duration::from_millis(u64::try_from(delay).unwrap_or(0));
    let scheduled = state.schedule(delay, move |context: &mut Context| {
        if let Err(error) = callback.call_raw(&JsValue::undefined(), &[], context) {
            log::warn!("timer callback threw: {error}");
            if let Some(state) = owner.upgrade() {
                state.record_exception(error);
            }
        }
    });

    if !scheduled {
        return Err(JsNativeError::typ()
            .with_message("setTimeout: timer pool is busy")
            .into());
    }
    Ok(JsValue::undefined())
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::js_engine::{Runtime, ScriptContext};

    fn script_context() -> ScriptContext {
        ScriptContext::new(Runtime::new(EngineConfig::without_cache())).unwrap()
    }

    #[test]
    fn test_console_log_joins_with_spaces() {
        let mut script = script_context();
        script.evaluate("console.log('a', 1, true, null, [1, 2])", "log.js");
        let lines = script.console().borrow().lines();
        assert_eq!(lines, vec!["a 1 true null 1,2".to_string()]);
    }

    #[test]
    fn test_console_error_level() {
        let mut script = script_context();
        script.evaluate("console.error('oops')", "log.js");
        let console = script.console();
        let console = console.borrow();
        let message = console.messages().last().unwrap();
        assert_eq!(message.level, crate::devtools::console::LogLevel::Error);
        assert_eq!(message.message, "oops");
    }

    #[test]
    fn test_set_timeout_rejects_bad_calls() {
        let mut script = script_context();
        for call in [
            "setTimeout(function () {})",
            "setTimeout('code', 5)",
            "setTimeout(function () {}, 1.5)",
            "setTimeout(function () {}, '5')",
            "setTimeout(function () {}, 5, 6)",
        ] {
            let value = script.evaluate(call, "timer.js");
            assert!(value.is_exception(), "{call} should throw");
            assert!(script.dump_error().unwrap().contains("TypeError"));
            assert_eq!(script.pending_timers(), 0, "{call} scheduled a timer");
        }
    }

    #[test]
    fn test_set_timeout_schedules_and_returns_undefined() {
        let mut script = script_context();
        let value = script.evaluate("setTimeout(function () { globalThis.fired = true; }, 0)", "timer.js");
        assert!(value.is_undefined());
        assert_eq!(script.pending_timers(), 1);

        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(script.run_timers(), 1);
        assert!(script.evaluate("fired", "check.js").to_bool());
    }

    #[test]
    fn test_throwing_timer_leaves_pending_error() {
        let mut script = script_context();
        script.evaluate("setTimeout(function () { throw new Error('late'); }, 0)", "timer.js");
        std::thread::sleep(std::time::Duration::from_millis(2));
        script.run_timers();
        assert!(script.dump_error().unwrap().contains("late"));
        assert_eq!(script.pending_timers(), 0);
    }
}
