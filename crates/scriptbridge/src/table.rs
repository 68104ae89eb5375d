//! Pending invocation tracking.
//!
//! The [`CorrelationTable`] maps invocation ids to single-use completion
//! slots. Removal from the map is the resolution step, so only the first
//! `resolve` for an id can deliver an outcome.

use std::sync::mpsc::SyncSender;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    error::{Error, Result},
    schema::InvocationId,
};

/// Terminal result of one invocation.
pub type Outcome = Result<Value>;

/// The waiting side of an invocation: an async handle or a blocked thread.
pub(crate) enum CompletionSlot {
    Async(oneshot::Sender<Outcome>),
    Blocking(SyncSender<Outcome>),
}

impl CompletionSlot {
    fn deliver(self, id: &InvocationId, outcome: Outcome) {
        let delivered = match self {
            Self::Async(tx) => tx.send(outcome).is_ok(),
            // Capacity is one and this is the only send, so try_send only fails on disconnect.
            Self::Blocking(tx) => tx.try_send(outcome).is_ok(),
        };
        if !delivered {
            tracing::debug!("Waiter dropped before invocation {} resolved", id);
        }
    }
}

/// Map of pending invocations keyed by id.
#[derive(Default)]
pub(crate) struct CorrelationTable {
    pending: DashMap<InvocationId, CompletionSlot>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a slot for a freshly allocated id.
    pub(crate) fn register(&self, id: InvocationId, slot: CompletionSlot) {
        if self.pending.insert(id.clone(), slot).is_some() {
            // Ids come from a process-wide counter; a collision means a caller forged one.
            tracing::warn!("Replaced existing pending entry for invocation {}", id);
        }
        tracing::debug!(
            "Registered invocation {}, total pending: {}",
            id,
            self.pending.len()
        );
    }

    /// Resolve a pending invocation. Returns false if it was absent or already resolved.
    pub(crate) fn resolve(&self, id: &InvocationId, outcome: Outcome) -> bool {
        match self.pending.remove(id) {
            Some((_, slot)) => {
                slot.deliver(id, outcome);
                true
            }
            None => false,
        }
    }

    /// Remove an entry without resolving it.
    pub(crate) fn discard(&self, id: &InvocationId) -> bool {
        self.pending.remove(id).is_some()
    }

    pub(crate) fn is_pending(&self, id: &InvocationId) -> bool {
        self.pending.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Fail every pending entry, used when the engine thread exits.
    pub(crate) fn fail_all(&self, error: &Error) -> usize {
        let ids: Vec<InvocationId> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.resolve(id, Err(error.clone())))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use serde_json::json;

    use super::*;

    fn async_entry(table: &CorrelationTable, id: &str) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        table.register(InvocationId::from(id), CompletionSlot::Async(tx));
        rx
    }

    #[test]
    fn resolve_removes_entry() {
        let table = CorrelationTable::new();
        let mut rx = async_entry(&table, "a");
        assert!(table.is_pending(&"a".into()));

        assert!(table.resolve(&"a".into(), Ok(json!(1))));
        assert_eq!(table.len(), 0);
        assert_eq!(rx.try_recv().unwrap(), Ok(json!(1)));
    }

    #[test]
    fn second_resolve_is_ignored() {
        let table = CorrelationTable::new();
        let mut rx = async_entry(&table, "a");

        assert!(table.resolve(&"a".into(), Ok(json!("first"))));
        assert!(!table.resolve(&"a".into(), Err(Error::engine("second"))));
        assert_eq!(rx.try_recv().unwrap(), Ok(json!("first")));
    }

    #[test]
    fn unknown_id_does_not_touch_other_entries() {
        let table = CorrelationTable::new();
        let mut rx = async_entry(&table, "a");

        assert!(!table.resolve(&"b".into(), Ok(json!(1))));
        assert!(table.is_pending(&"a".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn discard_then_resolve_is_noop() {
        let table = CorrelationTable::new();
        let _rx = async_entry(&table, "a");

        assert!(table.discard(&"a".into()));
        assert!(!table.discard(&"a".into()));
        assert!(!table.resolve(&"a".into(), Ok(json!(1))));
    }

    #[test]
    fn dropped_waiter_is_tolerated() {
        let table = CorrelationTable::new();
        drop(async_entry(&table, "a"));
        assert!(table.resolve(&"a".into(), Ok(json!(1))));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn blocking_slot_delivers() {
        let table = CorrelationTable::new();
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        table.register("a".into(), CompletionSlot::Blocking(tx));
        assert!(table.resolve(&"a".into(), Ok(json!(true))));
        assert_eq!(rx.recv().unwrap(), Ok(json!(true)));
    }

    #[test]
    fn fail_all_drains_table() {
        let table = CorrelationTable::new();
        let mut a = async_entry(&table, "a");
        let mut b = async_entry(&table, "b");

        assert_eq!(table.fail_all(&Error::Closed), 2);
        assert_eq!(table.len(), 0);
        assert_eq!(a.try_recv().unwrap(), Err(Error::Closed));
        assert_eq!(b.try_recv().unwrap(), Err(Error::Closed));
    }

    #[test]
    fn concurrent_resolves_deliver_once() {
        let table = Arc::new(CorrelationTable::new());
        let mut rx = async_entry(&table, "a");

        let winners: usize = (0..8)
            .map(|i| {
                let table = table.clone();
                thread::spawn(move || table.resolve(&"a".into(), Ok(json!(i))))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();

        assert_eq!(winners, 1);
        assert!(rx.try_recv().unwrap().is_ok());
    }
}
