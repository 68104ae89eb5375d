//! Hand-off of invocations to the engine thread.
//!
//! Callers allocate an id, register a completion slot and send a command over
//! an unbounded channel. The engine thread owns the engine and runs commands
//! one at a time, holding them back until the readiness gate opens.

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::BridgeState,
    engine::ScriptEngine,
    error::{Error, Result},
    gate::{GateState, Readiness},
    resolver::SignalSink,
    schema::InvocationId,
    table::CompletionSlot,
};

/// Work item for the engine thread.
pub(crate) enum Command {
    Evaluate { id: InvocationId, source: String },
}

/// Caller-side half of the dispatcher.
pub(crate) struct Dispatcher {
    state: Arc<BridgeState>,
    commands: mpsc::UnboundedSender<Command>,
    id_prefix: String,
}

impl Dispatcher {
    pub(crate) fn new(
        state: Arc<BridgeState>,
        commands: mpsc::UnboundedSender<Command>,
        id_prefix: String,
    ) -> Self {
        Self {
            state,
            commands,
            id_prefix,
        }
    }

    /// Register `slot` under a fresh id and queue `source` for evaluation.
    ///
    /// Failures that can be detected here resolve the slot immediately.
    pub(crate) fn dispatch(&self, source: String, slot: CompletionSlot) -> InvocationId {
        let id = InvocationId::next(&self.id_prefix);
        self.state.table.register(id.clone(), slot);

        if let Err(e) = check_encoding(&source) {
            self.state.table.resolve(&id, Err(e));
            return id;
        }

        tracing::debug!("Dispatching invocation {}", id);
        if self
            .commands
            .send(Command::Evaluate {
                id: id.clone(),
                source,
            })
            .is_err()
        {
            self.state.table.resolve(
                &id,
                Err(Error::transport("engine thread is not running")),
            );
        }
        id
    }
}

/// Engines receive source as text; interior NUL bytes cannot cross that boundary.
fn check_encoding(source: &str) -> Result<()> {
    match source.find('\0') {
        Some(pos) => Err(Error::Encoding(format!(
            "source contains a NUL byte at offset {pos}"
        ))),
        None => Ok(()),
    }
}

/// Start the engine thread.
///
/// `factory` runs on the new thread, so the engine it builds never has to be
/// `Send`.
pub(crate) fn spawn_engine_thread<E, F>(
    thread_name: String,
    state: Arc<BridgeState>,
    commands: mpsc::UnboundedReceiver<Command>,
    bootstrap_timeout: Duration,
    cancel: CancellationToken,
    factory: F,
) -> Result<JoinHandle<()>>
where
    E: ScriptEngine,
    F: FnOnce(SignalSink) -> Result<E> + Send + 'static,
{
    let handle = thread::Builder::new().name(thread_name).spawn(move || {
        let _ = state.engine_thread.set(thread::current().id());

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Failed to start engine runtime: {}", e);
                state
                    .gate
                    .open(Readiness::InitFailed(format!("engine runtime: {e}")));
                state.table.fail_all(&Error::Closed);
                return;
            }
        };

        let engine = match factory(SignalSink::new(state.clone())) {
            Ok(engine) => Some(engine),
            Err(e) => {
                state.gate.open(Readiness::InitFailed(e.to_string()));
                None
            }
        };

        let worker = EngineWorker {
            engine,
            state,
            commands,
            deferred: VecDeque::new(),
        };
        runtime.block_on(worker.run(bootstrap_timeout, cancel));
    })?;
    Ok(handle)
}

/// Engine-thread half of the dispatcher.
struct EngineWorker<E> {
    /// None when the factory failed; every command then fails fast.
    engine: Option<E>,
    state: Arc<BridgeState>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Commands received before the gate opened, in arrival order.
    deferred: VecDeque<Command>,
}

impl<E: ScriptEngine> EngineWorker<E> {
    async fn run(mut self, bootstrap_timeout: Duration, cancel: CancellationToken) {
        tracing::info!("Engine thread started");
        if self.bootstrap(bootstrap_timeout, &cancel).await {
            if !self.deferred.is_empty() {
                tracing::info!("Running {} deferred invocations", self.deferred.len());
            }
            while let Some(command) = self.deferred.pop_front() {
                self.execute(command);
            }
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => break,

                    command = self.commands.recv() => match command {
                        Some(command) => self.execute(command),
                        None => break,
                    },
                }
            }
        }
        self.close();
    }

    /// Hold commands until the gate opens. Returns false if the worker should stop.
    async fn bootstrap(&mut self, bootstrap_timeout: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + bootstrap_timeout;
        let mut gate = self.state.gate.subscribe();

        while !self.state.gate.is_ready() {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return false,

                changed = gate.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }

                () = sleep_until(deadline) => {
                    self.state.gate.open(Readiness::BootstrapTimeout);
                }

                command = self.commands.recv() => match command {
                    Some(command) => {
                        let Command::Evaluate { id, .. } = &command;
                        tracing::debug!("Deferring invocation {} until engine is ready", id);
                        self.deferred.push_back(command);
                    }
                    None => return false,
                },
            }
        }
        true
    }

    fn execute(&mut self, command: Command) {
        let Command::Evaluate { id, source } = command;
        let table = &self.state.table;

        if !table.is_pending(&id) {
            tracing::debug!("Skipping abandoned invocation {}", id);
            return;
        }

        if let GateState::Ready(Readiness::InitFailed(reason)) = self.state.gate.state() {
            table.resolve(
                &id,
                Err(Error::transport(format!("engine failed to initialize: {reason}"))),
            );
            return;
        }

        let Some(engine) = self.engine.as_mut() else {
            table.resolve(&id, Err(Error::transport("engine unavailable")));
            return;
        };

        let handed_off = catch_unwind(AssertUnwindSafe(|| {
            let program = engine.wrap(&id, &source)?;
            engine.evaluate(&id, program)
        }));

        match handed_off {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!("Invocation {} failed at hand-off: {}", id, e);
                table.resolve(&id, Err(e));
            }
            Err(_) => {
                tracing::warn!("Engine panicked while evaluating invocation {}", id);
                table.resolve(&id, Err(Error::engine("engine panicked during evaluation")));
            }
        }
    }

    /// Stop accepting commands and fail everything still waiting.
    fn close(mut self) {
        self.commands.close();
        let queued = self
            .deferred
            .drain(..)
            .chain(std::iter::from_fn(|| self.commands.try_recv().ok()))
            .collect::<Vec<_>>();
        for Command::Evaluate { id, .. } in queued {
            self.state.table.resolve(&id, Err(Error::Closed));
        }
        let failed = self.state.table.fail_all(&Error::Closed);
        tracing::info!("Engine thread stopped; failed {} pending invocations", failed);
    }
}
