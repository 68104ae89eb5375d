//! Test utilities for `scriptbridge`.
//!
//! [`ScriptedEngine`] is a deterministic stand-in for a real interpreter. Its
//! source language is a single command per invocation:
//!
//! - `value <json>`: push a value signal with the parsed JSON
//! - `throw <message>`: push an error signal
//! - `hold`: push nothing; the test resolves it through [`Bridge::signals`]
//! - `reject <message>`: fail the hand-off synchronously
//! - `raw <text>`: post `<text>` unmodified to the signal sink
//! - `panic`: panic inside the engine
//! - empty source: push a `null` value
//!
//! Every evaluated id is reported to the [`EngineProbe`] so tests can observe
//! dispatch order and address held invocations.

use std::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel},
    },
    time::Duration,
};

use serde_json::Value;

use crate::{
    Bridge, BridgeConfig, Error, InvocationId, Result, ScriptEngine, Signal, SignalSink,
};

/// Deterministic engine driven by one-line commands.
pub struct ScriptedEngine {
    sink: SignalSink,
    evaluated: Sender<InvocationId>,
}

impl ScriptedEngine {
    /// Create an engine that reports evaluated ids to `evaluated`.
    pub fn new(sink: SignalSink, evaluated: Sender<InvocationId>) -> Self {
        Self { sink, evaluated }
    }
}

impl ScriptEngine for ScriptedEngine {
    fn wrap(&self, id: &InvocationId, source: &str) -> Result<String> {
        // The first line carries the correlation id into the engine.
        Ok(format!("{id}\n{source}"))
    }

    fn evaluate(&mut self, id: &InvocationId, program: String) -> Result<()> {
        let (program_id, source) = program.split_once('\n').unwrap_or((program.as_str(), ""));
        if program_id != id.as_str() {
            return Err(Error::transport("wrapped program lost its invocation id"));
        }
        let _ = self.evaluated.send(id.clone());

        let source = source.trim();
        let (command, arg) = source.split_once(' ').unwrap_or((source, ""));
        match command {
            "" => {
                self.sink.signal(Signal::value(id.clone(), Value::Null));
            }
            "value" => {
                let value = serde_json::from_str(arg)
                    .map_err(|e| Error::Encoding(format!("bad value literal: {e}")))?;
                self.sink.signal(Signal::value(id.clone(), value));
            }
            "throw" => {
                self.sink.signal(Signal::error(id.clone(), arg));
            }
            "hold" => {}
            "reject" => return Err(Error::transport(arg)),
            "raw" => {
                self.sink.post(arg);
            }
            "panic" => panic!("scripted engine panic"),
            other => return Err(Error::engine(format!("unknown command: {other}"))),
        }
        Ok(())
    }
}

/// Observes the ids a [`ScriptedEngine`] evaluates.
pub struct EngineProbe {
    evaluated: Mutex<Receiver<InvocationId>>,
}

impl EngineProbe {
    /// Wait for the next evaluated id.
    pub fn next_evaluated(&self, wait: Duration) -> Option<InvocationId> {
        self.evaluated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recv_timeout(wait)
            .ok()
    }

    /// Collect the next `n` evaluated ids, waiting at most `wait` for each.
    pub fn take_evaluated(&self, n: usize, wait: Duration) -> Vec<InvocationId> {
        (0..n).map_while(|_| self.next_evaluated(wait)).collect()
    }
}

/// Spawn a bridge backed by a [`ScriptedEngine`].
///
/// With `auto_ready` the engine reports readiness as soon as it is built;
/// otherwise the test opens the gate itself or lets the bootstrap timeout fire.
pub fn scripted_bridge(config: BridgeConfig, auto_ready: bool) -> Result<(Bridge, EngineProbe)> {
    let (tx, rx) = channel();
    let bridge = Bridge::spawn(config, move |sink: SignalSink| {
        if auto_ready {
            sink.ready();
        }
        Ok(ScriptedEngine::new(sink, tx))
    })?;
    Ok((
        bridge,
        EngineProbe {
            evaluated: Mutex::new(rx),
        },
    ))
}

/// A ready scripted bridge with default configuration.
pub fn ready_scripted_bridge() -> Result<(Bridge, EngineProbe)> {
    scripted_bridge(BridgeConfig::default(), true)
}
