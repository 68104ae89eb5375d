//! One-way readiness state for the engine.

use std::time::Duration;

use tokio::{sync::watch, time::timeout};

use crate::error::{Error, Result};

/// Why the gate opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The engine reported that it is ready.
    Signalled,
    /// The engine reported an initialization failure; dispatches fail fast.
    InitFailed(String),
    /// No signal arrived before the bootstrap timeout.
    BootstrapTimeout,
}

/// Current state of the readiness gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Initializing,
    Ready(Readiness),
}

impl GateState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Gate that transitions from `Initializing` to `Ready` exactly once.
pub(crate) struct ReadinessGate {
    state: watch::Sender<GateState>,
}

impl ReadinessGate {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(GateState::Initializing);
        Self { state }
    }

    pub(crate) fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Open the gate. Returns false if it was already open.
    pub(crate) fn open(&self, readiness: Readiness) -> bool {
        let opened = self.state.send_if_modified(|state| {
            if state.is_ready() {
                return false;
            }
            *state = GateState::Ready(readiness.clone());
            true
        });

        if opened {
            match &readiness {
                Readiness::Signalled => tracing::info!("Engine ready"),
                Readiness::InitFailed(reason) => {
                    tracing::warn!("Engine initialization failed: {}", reason)
                }
                Readiness::BootstrapTimeout => {
                    tracing::warn!("Engine did not report readiness; opening gate after timeout")
                }
            }
        } else {
            tracing::debug!("Ignoring readiness trigger {:?}; gate already open", readiness);
        }
        opened
    }

    /// Wait until the gate opens or the timeout elapses.
    pub(crate) async fn wait_ready(&self, wait: Duration) -> Result<Readiness> {
        let mut rx = self.subscribe();
        match timeout(wait, rx.wait_for(GateState::is_ready)).await {
            Ok(Ok(state)) => match &*state {
                GateState::Ready(readiness) => Ok(readiness.clone()),
                GateState::Initializing => Err(Error::Closed),
            },
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::NotReady {
                timeout_ms: wait.as_millis() as u64,
            }),
        }
    }
}
