use crate::{error::Result, schema::InvocationId};

/// An embedded script engine driven by the bridge.
///
/// Engines live on the bridge's engine thread and are never moved off it, so
/// implementations do not need to be `Send`. Results are not returned from
/// [`evaluate`](ScriptEngine::evaluate); the engine reports them later through
/// the [`SignalSink`](crate::SignalSink) it was constructed with.
pub trait ScriptEngine: 'static {
    /// Build the engine-native program for one invocation.
    ///
    /// The program must make `id` addressable inside the engine, run `source`,
    /// and push exactly one signal tagged with `id`: an error signal if the
    /// source raises, otherwise a value signal (`null` when the source
    /// produces no value). Return [`Error::Encoding`](crate::Error::Encoding)
    /// if `source` cannot be carried safely.
    fn wrap(&self, id: &InvocationId, source: &str) -> Result<String>;

    /// Hand a wrapped program to the engine.
    ///
    /// An `Err` means the hand-off failed before any signal could be pushed;
    /// the bridge fails the invocation with it immediately.
    fn evaluate(&mut self, id: &InvocationId, program: String) -> Result<()>;
}
