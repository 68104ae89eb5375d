//! Inbound signal handling.
//!
//! The [`SignalSink`] is the engine's only way to report results and
//! readiness. Signals may arrive on any thread, in any order, and any number
//! of times per id; only the first signal for a pending id has an effect.

use std::sync::Arc;

use crate::{
    bridge::BridgeState,
    error::Error,
    gate::Readiness,
    schema::{InboundMessage, LifecycleSignal, Signal},
    table::Outcome,
};

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A pending invocation was resolved.
    Resolved,
    /// The id was unknown or already resolved; the signal was dropped.
    Unmatched,
    /// The message could not be parsed or attributed to an id.
    Malformed,
    /// A lifecycle message; `opened` is true if it opened the gate.
    Lifecycle { opened: bool },
}

/// Handle through which the engine pushes signals into the bridge.
#[derive(Clone)]
pub struct SignalSink {
    state: Arc<BridgeState>,
}

impl SignalSink {
    pub(crate) fn new(state: Arc<BridgeState>) -> Self {
        Self { state }
    }

    /// Resolve the invocation named by `signal`.
    pub fn signal(&self, signal: Signal) -> Disposition {
        let Signal { id, value, error } = signal;
        let outcome: Outcome = match error {
            Some(message) => Err(Error::Engine(message)),
            None => Ok(value.unwrap_or_default()),
        };

        if self.state.table.resolve(&id, outcome) {
            tracing::debug!(
                "Resolved invocation {}, pending: {}",
                id,
                self.state.table.len()
            );
            Disposition::Resolved
        } else {
            tracing::warn!("Received signal for unknown or resolved invocation: {}", id);
            Disposition::Unmatched
        }
    }

    /// Handle a raw JSON message from the engine.
    pub fn post(&self, raw: &str) -> Disposition {
        match InboundMessage::parse(raw) {
            Ok(InboundMessage::Signal(signal)) => self.signal(signal),
            Ok(InboundMessage::Lifecycle(LifecycleSignal::Ready)) => self.ready(),
            Ok(InboundMessage::Lifecycle(LifecycleSignal::InitError { error })) => {
                self.init_failed(error)
            }
            Err(e) => {
                tracing::warn!("Dropping malformed engine signal: {}", e);
                Disposition::Malformed
            }
        }
    }

    /// Report that the engine can accept work.
    pub fn ready(&self) -> Disposition {
        Disposition::Lifecycle {
            opened: self.state.gate.open(Readiness::Signalled),
        }
    }

    /// Report that the engine failed to initialize.
    pub fn init_failed(&self, reason: impl Into<String>) -> Disposition {
        Disposition::Lifecycle {
            opened: self.state.gate.open(Readiness::InitFailed(reason.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::{gate::GateState, schema::InvocationId, table::CompletionSlot};

    fn sink_with_pending(ids: &[&str]) -> (SignalSink, Vec<oneshot::Receiver<Outcome>>) {
        let state = Arc::new(BridgeState::new());
        let receivers = ids
            .iter()
            .map(|id| {
                let (tx, rx) = oneshot::channel();
                state
                    .table
                    .register(InvocationId::from(*id), CompletionSlot::Async(tx));
                rx
            })
            .collect();
        (SignalSink::new(state), receivers)
    }

    #[test]
    fn value_and_error_signals_resolve() {
        let (sink, mut rx) = sink_with_pending(&["a", "b"]);

        assert_eq!(sink.signal(Signal::value("a", json!(42))), Disposition::Resolved);
        assert_eq!(sink.signal(Signal::error("b", "boom")), Disposition::Resolved);

        assert_eq!(rx[0].try_recv().unwrap(), Ok(json!(42)));
        assert_eq!(rx[1].try_recv().unwrap(), Err(Error::engine("boom")));
    }

    #[test]
    fn missing_value_resolves_to_null() {
        let (sink, mut rx) = sink_with_pending(&["a"]);
        assert_eq!(sink.post(r#"{"id":"a"}"#), Disposition::Resolved);
        assert_eq!(rx[0].try_recv().unwrap(), Ok(serde_json::Value::Null));
    }

    #[test]
    fn duplicate_signal_is_unmatched() {
        let (sink, mut rx) = sink_with_pending(&["a"]);
        assert_eq!(sink.signal(Signal::value("a", json!(1))), Disposition::Resolved);
        assert_eq!(sink.signal(Signal::value("a", json!(2))), Disposition::Unmatched);
        assert_eq!(rx[0].try_recv().unwrap(), Ok(json!(1)));
    }

    #[test]
    fn unknown_and_malformed_signals_leave_pending_alone() {
        let (sink, mut rx) = sink_with_pending(&["a"]);

        assert_eq!(sink.signal(Signal::error("zzz", "boom")), Disposition::Unmatched);
        assert_eq!(sink.post("{ not json"), Disposition::Malformed);
        assert_eq!(sink.post(r#"{"error":"no id"}"#), Disposition::Malformed);

        assert!(rx[0].try_recv().is_err());
        assert_eq!(sink.state.table.len(), 1);
    }

    #[test]
    fn lifecycle_messages_drive_gate() {
        let (sink, _) = sink_with_pending(&[]);
        assert_eq!(
            sink.post(r#"{"type":"init_error","error":"no runtime"}"#),
            Disposition::Lifecycle { opened: true }
        );
        assert_eq!(sink.ready(), Disposition::Lifecycle { opened: false });
        assert_eq!(
            sink.state.gate.state(),
            GateState::Ready(Readiness::InitFailed("no runtime".into()))
        );
    }
}
