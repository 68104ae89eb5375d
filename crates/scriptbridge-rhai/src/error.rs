use std::sync::Arc;

use rhai::{EvalAltResult, ParseError};

/// Errors that end a Rhai evaluation without a signal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    /// The script exceeded the configured wall-clock limit.
    #[error("Script timed out after {ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        ms: u64,
    },
    /// The program failed to parse.
    #[error("Parse error: {0}")]
    Parse(ParseError),
    /// The script failed in a way `try`/`catch` cannot intercept.
    #[error("Runtime error: {0}")]
    Runtime(Arc<EvalAltResult>),
}

impl ScriptError {
    /// Classify an evaluation failure, recovering our own timeout token.
    pub(crate) fn from_eval(err: Box<EvalAltResult>) -> Self {
        let token = match err.as_ref() {
            EvalAltResult::ErrorTerminated(token, _) | EvalAltResult::ErrorRuntime(token, _) => {
                token.clone().try_cast::<ScriptError>()
            }
            _ => None,
        };
        token.unwrap_or_else(|| Self::Runtime(Arc::from(err)))
    }
}

impl From<ScriptError> for scriptbridge::Error {
    /// Rhai messages already carry their `(line N, position M)` location.
    fn from(err: ScriptError) -> Self {
        Self::Engine(err.to_string())
    }
}
