use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{sync::oneshot, time::timeout};

use crate::{
    bridge::BridgeState,
    error::{Error, Result},
    schema::InvocationId,
    table::Outcome,
};

/// Pending result of a non-blocking invocation.
///
/// Awaiting the handle yields the engine's value or error. Dropping it before
/// resolution abandons the invocation; a later signal for it is ignored.
pub struct InvocationHandle {
    id: InvocationId,
    rx: oneshot::Receiver<Outcome>,
    state: Arc<BridgeState>,
}

impl InvocationHandle {
    pub(crate) fn new(
        id: InvocationId,
        rx: oneshot::Receiver<Outcome>,
        state: Arc<BridgeState>,
    ) -> Self {
        Self { id, rx, state }
    }

    /// Correlation id assigned to this invocation.
    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    /// Wait for the result, giving up after `timeout_ms`.
    ///
    /// Giving up does not stop the engine; it only abandons this invocation.
    pub async fn wait_timeout(mut self, timeout_ms: u64) -> Result<Value> {
        match timeout(Duration::from_millis(timeout_ms), &mut self).await {
            Ok(outcome) => outcome,
            Err(_) => self.expire(timeout_ms),
        }
    }

    fn expire(&mut self, timeout_ms: u64) -> Result<Value> {
        if !self.state.table.discard(&self.id) {
            // Resolution won the race with the discard; its outcome is already queued.
            if let Ok(outcome) = self.rx.try_recv() {
                return outcome;
            }
        }
        tracing::warn!("Invocation {} timed out after {}ms", self.id, timeout_ms);
        Err(Error::Timeout {
            invocation_id: self.id.to_string(),
            timeout_ms,
        })
    }

    /// Wait for the result and decode it into `T`.
    pub async fn decode<T: DeserializeOwned>(self) -> Result<T> {
        decode_value(self.await?)
    }
}

impl Future for InvocationHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for InvocationHandle {
    fn drop(&mut self) {
        if self.state.table.discard(&self.id) {
            tracing::debug!("Abandoned invocation {}", self.id);
        }
    }
}

/// Adapt a raw engine value into the caller's requested type.
pub(crate) fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::TypeMismatch(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::table::CompletionSlot;

    fn async_entry(state: &Arc<BridgeState>, id: &str) -> InvocationHandle {
        let (tx, rx) = oneshot::channel();
        state
            .table
            .register(InvocationId::from(id), CompletionSlot::Async(tx));
        InvocationHandle::new(InvocationId::from(id), rx, state.clone())
    }

    #[test]
    fn expiry_returns_outcome_that_won_the_race() {
        let state = Arc::new(BridgeState::new());
        let mut handle = async_entry(&state, "a");
        assert!(state.table.resolve(&"a".into(), Ok(json!("late"))));
        assert_eq!(handle.expire(10), Ok(json!("late")));
    }

    #[test]
    fn expiry_discards_unresolved_entry() {
        let state = Arc::new(BridgeState::new());
        let mut handle = async_entry(&state, "a");
        assert_eq!(
            handle.expire(10),
            Err(Error::Timeout {
                invocation_id: "a".to_string(),
                timeout_ms: 10
            })
        );
        assert!(!state.table.is_pending(&"a".into()));
        assert!(!state.table.resolve(&"a".into(), Ok(json!(1))));
    }

    #[tokio::test]
    async fn wait_timeout_expires_unresolved_entry() {
        let state = Arc::new(BridgeState::new());
        let handle = async_entry(&state, "b");
        assert!(handle.wait_timeout(10).await.unwrap_err().is_timeout());
        assert_eq!(state.table.len(), 0);
    }

    #[test]
    fn decode_reports_type_mismatch() {
        assert_eq!(decode_value::<u32>(json!(42)), Ok(42));
        assert!(matches!(
            decode_value::<u32>(json!("forty-two")),
            Err(Error::TypeMismatch(_))
        ));
    }
}
