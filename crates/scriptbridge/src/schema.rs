//! Wire types exchanged with the embedded engine.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Process-wide counter so ids stay unique across bridge instances.
static NEXT_INVOCATION: AtomicU64 = AtomicU64::new(1);

/// Correlation token for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(String);

impl InvocationId {
    /// Allocate a fresh id with the given prefix. Ids are never reused.
    pub(crate) fn next(prefix: &str) -> Self {
        let n = NEXT_INVOCATION.fetch_add(1, Ordering::Relaxed);
        Self(format!("{prefix}-{n}"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for InvocationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InvocationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A completion signal pushed by the engine for one invocation.
///
/// When both `value` and `error` are present the error wins. A signal with
/// neither resolves to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: InvocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Signal {
    /// A successful return signal.
    pub fn value(id: impl Into<InvocationId>, value: Value) -> Self {
        Self {
            id: id.into(),
            value: Some(value),
            error: None,
        }
    }

    /// A failure signal carrying the engine's error message.
    pub fn error(id: impl Into<InvocationId>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: None,
            error: Some(error.into()),
        }
    }
}

/// Engine bootstrap messages consumed by the readiness gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleSignal {
    Ready,
    InitError { error: String },
}

/// Any message that can arrive on the engine's signal channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Lifecycle(LifecycleSignal),
    Signal(Signal),
}

impl InboundMessage {
    /// Parse a raw JSON message.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = InvocationId::next("inv");
        let b = InvocationId::next("inv");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("inv-"));
        assert_eq!(format!("{a}"), a.as_str());
    }

    #[test]
    fn parses_value_and_error_signals() {
        let msg = InboundMessage::parse(r#"{"id":"inv-1","value":42}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Signal(Signal::value("inv-1", json!(42)))
        );

        let msg = InboundMessage::parse(r#"{"id":"inv-2","error":"boom"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Signal(Signal::error("inv-2", "boom")));
    }

    #[test]
    fn parses_lifecycle_messages() {
        let msg = InboundMessage::parse(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Lifecycle(LifecycleSignal::Ready));

        let msg = InboundMessage::parse(r#"{"type":"init_error","error":"no runtime"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Lifecycle(LifecycleSignal::InitError {
                error: "no runtime".to_string()
            })
        );
    }

    #[test]
    fn rejects_unattributable_messages() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse(r#"{"value":1}"#).is_err());
        assert!(InboundMessage::parse(r#"{"id":5,"value":1}"#).is_err());
    }

    #[test]
    fn signal_serialization_omits_absent_fields() {
        let json = serde_json::to_string(&Signal::error("inv-3", "bad")).unwrap();
        assert_eq!(json, r#"{"id":"inv-3","error":"bad"}"#);
    }
}
