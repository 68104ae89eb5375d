//! # scriptbridge
//!
//! Correlates script evaluations on a single-threaded embedded engine with
//! any number of synchronous and asynchronous callers.
//!
//! ## Overview
//!
//! An embedded interpreter usually demands that every evaluation happens on one
//! thread, and it reports results through a side channel rather than as the
//! return value of the call that started them. A [`Bridge`] hides both facts:
//!
//! - all evaluations run on a dedicated engine thread, one at a time
//! - each invocation gets a unique [`InvocationId`] and resolves exactly once
//! - [`Bridge::invoke`] returns a future; [`Bridge::invoke_blocking`] blocks
//!   the caller for a bounded time
//! - invocations made before the engine reports readiness are queued, not lost
//!
//! Engines implement [`ScriptEngine`] and push results into the
//! [`SignalSink`] they are constructed with.
//!
//! ## Limitations
//!
//! There is no way to interrupt an evaluation once the engine has started it.
//! Timeouts abandon the wait, not the work; the late result is discarded.

/// Sync adaptation over the async completion path.
mod blocking;
/// Bridge facade.
mod bridge;
/// Bridge configuration.
mod config;
/// Hand-off of invocations to the engine thread.
mod dispatcher;
/// Engine collaborator trait.
mod engine;
/// Error types and Result alias.
mod error;
/// Readiness gate.
mod gate;
/// Async invocation handle.
mod handle;
/// Inbound signal handling.
mod resolver;
/// Pending invocation tracking.
mod table;

pub mod schema;
pub mod testutils;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use engine::ScriptEngine;
pub use error::{Error, Result};
pub use gate::{GateState, Readiness};
pub use handle::InvocationHandle;
pub use resolver::{Disposition, SignalSink};
pub use schema::{InvocationId, LifecycleSignal, Signal};
pub use table::Outcome;
