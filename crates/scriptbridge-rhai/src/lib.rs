#![warn(missing_docs)]

//! Rhai engine adapter for scriptbridge.
//!
//! [`RhaiEngine`] runs each invocation as a top-level Rhai program on the
//! bridge's engine thread and reports its value or raised error through the
//! bridge's signal sink. Hosts extend the language through [`ScriptApi`].

mod config;
mod engine;
mod error;
mod executor;

pub use config::ScriptConfig;
pub use error::ScriptError;
pub use executor::{NoApi, RhaiEngine, ScriptApi, spawn_rhai_bridge};
