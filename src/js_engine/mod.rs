//! JavaScript engine integration
//!
//! Bridges native code and the Boa engine: value marshaling, scoped values,
//! function handles, native classes with explicit ownership, the timer pool
//! and the per-page script context.

mod class;
mod context;
mod dom_bindings;
mod function;
mod globals;
pub mod marshal;
mod object;
mod runtime;
mod scoped;
pub mod timers;
mod value;

pub use class::{ClassBuilder, ClassId, ClassRecord, Scriptable};
pub use context::{CONTEXT_GLOBAL, ScriptContext, get_global_native, is_module_source, set_global_native};
pub use dom_bindings::{DOCUMENT_GLOBAL, DomElement, WebDom};
pub use function::ScriptFunction;
pub use marshal::{to_native, to_script};
pub use object::{Object, ObjectRef, Ownership};
pub use runtime::Runtime;
pub use scoped::{ScriptScalar, Value};
pub use timers::TimerPool;
pub use value::DynamicValue;
