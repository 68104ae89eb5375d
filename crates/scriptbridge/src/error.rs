use std::{io, result::Result as StdResult};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Error type for bridge operations.
pub enum Error {
    /// Source or result could not be carried across the engine boundary.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The embedded engine raised during evaluation.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The hand-off to the engine failed before any correlated signal.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Waiting for an invocation exceeded its deadline.
    #[error("Invocation timed out after {timeout_ms}ms: {invocation_id}")]
    Timeout {
        /// The invocation that timed out.
        invocation_id: String,
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// A resolved value could not be decoded into the requested type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A blocking call was made on the engine thread.
    #[error("Blocking invocation on the engine thread would deadlock")]
    AffinityViolation,

    /// The engine did not become ready in time.
    #[error("Engine not ready after {timeout_ms}ms")]
    NotReady {
        /// Wait duration in milliseconds.
        timeout_ms: u64,
    },

    /// The bridge shut down before the invocation resolved.
    #[error("Bridge closed")]
    Closed,

    /// Invalid configuration error.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error with a message.
    #[error("IO error: {message}")]
    Io {
        /// Error message details.
        message: String,
    },

    /// JSON serialization or parsing error.
    #[error("JSON serialization error: {message}")]
    JsonParse {
        /// Error message details.
        message: String,
    },
}

impl Error {
    /// Create an Engine error from any message.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create a Transport error from any message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether this error is a wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
        }
    }
}

/// Result alias using the crate error type.
pub type Result<T> = StdResult<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_names_invocation() {
        let err = Error::Timeout {
            invocation_id: "inv-7".to_string(),
            timeout_ms: 10,
        };
        assert_eq!(err.to_string(), "Invocation timed out after 10ms: inv-7");
        assert!(err.is_timeout());
        assert!(!Error::Closed.is_timeout());
    }

    #[test]
    fn serde_errors_convert() {
        let err: Error = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(matches!(err, Error::JsonParse { .. }));
    }
}
