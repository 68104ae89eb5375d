use std::{
    sync::{Arc, Mutex, OnceLock},
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    blocking,
    config::BridgeConfig,
    dispatcher::{Dispatcher, spawn_engine_thread},
    engine::ScriptEngine,
    error::Result,
    gate::{GateState, Readiness, ReadinessGate},
    handle::{InvocationHandle, decode_value},
    resolver::SignalSink,
    table::{CompletionSlot, CorrelationTable},
};

/// State shared between callers, the engine thread and the signal sink.
pub(crate) struct BridgeState {
    pub(crate) table: CorrelationTable,
    pub(crate) gate: ReadinessGate,
    /// Set once by the engine thread when it starts.
    pub(crate) engine_thread: OnceLock<ThreadId>,
}

impl BridgeState {
    pub(crate) fn new() -> Self {
        Self {
            table: CorrelationTable::new(),
            gate: ReadinessGate::new(),
            engine_thread: OnceLock::new(),
        }
    }
}

/// Entry point for evaluating source on an embedded engine.
///
/// A bridge owns one engine thread. Any number of threads or tasks may invoke
/// it concurrently; evaluations run one at a time on the engine thread and
/// each invocation resolves exactly once.
pub struct Bridge {
    state: Arc<BridgeState>,
    dispatcher: Dispatcher,
    config: BridgeConfig,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Start an engine thread and build the engine on it with `factory`.
    ///
    /// The factory receives the [`SignalSink`] the engine must use to report
    /// results and readiness. If it returns an error the gate opens in a
    /// failed state and every invocation fails fast.
    pub fn spawn<E, F>(config: BridgeConfig, factory: F) -> Result<Self>
    where
        E: ScriptEngine,
        F: FnOnce(SignalSink) -> Result<E> + Send + 'static,
    {
        config.validate()?;

        let state = Arc::new(BridgeState::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = spawn_engine_thread(
            config.thread_name.clone(),
            state.clone(),
            commands_rx,
            config.bootstrap_timeout,
            cancel.clone(),
            factory,
        )?;
        tracing::info!("Spawned engine thread {}", config.thread_name);

        Ok(Self {
            dispatcher: Dispatcher::new(state.clone(), commands_tx, config.id_prefix.clone()),
            state,
            config,
            cancel,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Evaluate `source` without blocking.
    ///
    /// Invocations made before the engine is ready are queued and run once it is.
    pub fn invoke(&self, source: impl Into<String>) -> InvocationHandle {
        let (tx, rx) = oneshot::channel();
        let id = self
            .dispatcher
            .dispatch(source.into(), CompletionSlot::Async(tx));
        InvocationHandle::new(id, rx, self.state.clone())
    }

    /// Evaluate `source` and decode the result, waiting at most the configured
    /// default timeout.
    pub async fn invoke_as<T: DeserializeOwned>(&self, source: impl Into<String>) -> Result<T> {
        let value = self
            .invoke(source)
            .wait_timeout(self.config.default_timeout_ms)
            .await?;
        decode_value(value)
    }

    /// Evaluate `source`, blocking the current thread for at most `timeout_ms`.
    ///
    /// Fails with [`Error::AffinityViolation`](crate::Error::AffinityViolation)
    /// when called on the engine thread.
    pub fn invoke_blocking(&self, source: impl Into<String>, timeout_ms: u64) -> Result<Value> {
        blocking::invoke_blocking(&self.state, &self.dispatcher, source.into(), timeout_ms)
    }

    /// Blocking variant of [`invoke_as`](Self::invoke_as).
    pub fn invoke_blocking_as<T: DeserializeOwned>(
        &self,
        source: impl Into<String>,
        timeout_ms: u64,
    ) -> Result<T> {
        decode_value(self.invoke_blocking(source, timeout_ms)?)
    }

    /// Wait until the engine is ready, or until `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<Readiness> {
        self.state.gate.wait_ready(timeout).await
    }

    /// Current readiness state.
    pub fn state(&self) -> GateState {
        self.state.gate.state()
    }

    /// Sink for signals that arrive out of band, e.g. from an engine transport
    /// owned by the host.
    pub fn signals(&self) -> SignalSink {
        SignalSink::new(self.state.clone())
    }

    /// Number of invocations waiting for a result.
    pub fn pending(&self) -> usize {
        self.state.table.len()
    }

    /// Whether the current thread is the engine thread.
    pub fn on_engine_thread(&self) -> bool {
        self.state.engine_thread.get() == Some(&thread::current().id())
    }

    /// Stop the engine thread and fail all pending invocations.
    ///
    /// The current evaluation, if any, runs to completion first. When called
    /// from the engine thread itself the thread is signalled but not joined.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if self.on_engine_thread() {
            return;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            tracing::warn!("Engine thread panicked during shutdown");
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
