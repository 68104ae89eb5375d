use std::time::Duration;

use crate::error::{Error, Result};

/// Default wait bound for async typed invocations in milliseconds (30 seconds).
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long the engine may take to report readiness before the gate opens anyway.
    pub bootstrap_timeout: Duration,
    /// Wait bound used by [`Bridge::invoke_as`](crate::Bridge::invoke_as).
    pub default_timeout_ms: u64,
    /// Prefix for invocation ids, e.g. "inv" yields "inv-1".
    pub id_prefix: String,
    /// Name of the engine thread.
    pub thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Duration::from_secs(10),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            id_prefix: "inv".to_string(),
            thread_name: "scriptbridge-engine".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Set the bootstrap timeout.
    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    /// Set the default wait bound in milliseconds.
    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set the invocation id prefix.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Set the engine thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Check that the configuration can be used to start a bridge.
    ///
    /// Ids are embedded verbatim into engine programs, so the prefix is limited
    /// to ASCII alphanumerics, `-` and `_`.
    pub fn validate(&self) -> Result<()> {
        if self.id_prefix.is_empty() {
            return Err(Error::InvalidConfiguration(
                "id_prefix must not be empty".to_string(),
            ));
        }
        if let Some(c) = self
            .id_prefix
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::InvalidConfiguration(format!(
                "id_prefix contains unsupported character {c:?}"
            )));
        }
        if self.thread_name.is_empty() {
            return Err(Error::InvalidConfiguration(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
