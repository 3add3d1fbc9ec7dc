//! # webhost - HTML document host with a JavaScript bridge
//!
//! Parses HTML documents, styles them through a CSS cascade and runs their
//! scripts in an embedded JavaScript engine that can see and mutate the DOM.
//!
//! ## Architecture
//!
//! - **engine**: pages, custom elements and the shared loader context
//! - **renderer**: HTML parsing, CSS parsing, cascade and the element tree
//! - **js_engine**: script context, value marshaling, native classes, timers
//!   and the DOM bindings
//! - **network**: scheme-based loading, disk cache and background fetches
//! - **devtools**: the script console
//! - **config**: engine settings from the environment
//! - **utils**: shared error types

pub mod config;
pub mod devtools;
pub mod engine;
pub mod js_engine;
pub mod network;
pub mod renderer;
pub mod utils;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use engine::{PageClient, WebContext, WebPage};
pub use js_engine::{DynamicValue, Runtime, ScriptContext};
pub use utils::error::{Result, WebError};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "webhost";
