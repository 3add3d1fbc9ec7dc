//! Developer tools
//!
//! - Console: bounded sink for `console.*` output and dumped script errors

pub mod console;

pub use console::{Console, ConsoleMessage, LogLevel};
