//! Blocking waits on top of the async completion path.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, sync_channel},
    thread,
    time::Duration,
};

use serde_json::Value;

use crate::{
    bridge::BridgeState,
    dispatcher::Dispatcher,
    error::{Error, Result},
    schema::InvocationId,
    table::{CompletionSlot, Outcome},
};

/// Dispatch `source` and block the current thread until it resolves or
/// `timeout_ms` elapses.
///
/// Must not be called on the engine thread: the engine could never run the
/// invocation this thread is waiting for, so such calls fail with
/// [`Error::AffinityViolation`] instead of deadlocking.
pub(crate) fn invoke_blocking(
    state: &BridgeState,
    dispatcher: &Dispatcher,
    source: String,
    timeout_ms: u64,
) -> Result<Value> {
    if state.engine_thread.get() == Some(&thread::current().id()) {
        tracing::warn!("Rejected blocking invocation from the engine thread");
        return Err(Error::AffinityViolation);
    }

    let (tx, rx) = sync_channel(1);
    let id = dispatcher.dispatch(source, CompletionSlot::Blocking(tx));
    wait(state, &id, &rx, timeout_ms)
}

fn wait(
    state: &BridgeState,
    id: &InvocationId,
    rx: &Receiver<Outcome>,
    timeout_ms: u64,
) -> Result<Value> {
    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => {
            if !state.table.discard(id) {
                // Resolution won the race with the discard; its outcome is already queued.
                if let Ok(outcome) = rx.try_recv() {
                    return outcome;
                }
            }
            tracing::warn!("Invocation {} timed out after {}ms", id, timeout_ms);
            Err(Error::Timeout {
                invocation_id: id.to_string(),
                timeout_ms,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::Closed),
    }
}
