//! Engine lifecycle: one state machine per engine instance, guarded transitions.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

/// Lifecycle states of the engine instance. Monotonic except for the explicit
/// stop transition; outbound and inbound traffic are defined only in `Running`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized = 0,
    Initialized = 1,
    Running = 2,
    Stopped = 3,
}

impl EngineState {
    fn from_u8(v: u8) -> EngineState {
        match v {
            0 => EngineState::Uninitialized,
            1 => EngineState::Initialized,
            2 => EngineState::Running,
            _ => EngineState::Stopped,
        }
    }
}

/// Operation invoked outside its required state. Fatal to the call, not to the
/// process; the caller may retry once the state is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation requires the {required:?} state, but the engine is {actual:?}")]
pub struct LifecycleError {
    pub required: EngineState,
    pub actual: EngineState,
}

/// Atomic state slot shared between the application threads, the gateway, and
/// the engine-owned dispatch threads.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        StateCell(AtomicU8::new(EngineState::Uninitialized as u8))
    }

    pub fn current(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from` -> `to`, failing fast if the cell is in any other state.
    pub fn transition(&self, from: EngineState, to: EngineState) -> Result<(), LifecycleError> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| LifecycleError {
                required: from,
                actual: EngineState::from_u8(actual),
            })
    }

    /// Check the cell without changing it.
    pub fn require(&self, required: EngineState) -> Result<(), LifecycleError> {
        let actual = self.current();
        if actual == required {
            Ok(())
        } else {
            Err(LifecycleError { required, actual })
        }
    }

    /// Unconditionally enter `to`. Used for the terminal stop when the engine
    /// run loop returns, where the previous state no longer matters.
    pub fn force(&self, to: EngineState) {
        self.0.store(to as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to the engine at start. The engine signals it exactly once, when the
/// overlay is accepting traffic; that is the Initialized -> Running transition.
#[derive(Clone)]
pub struct Ready {
    state: Arc<StateCell>,
}

impl Ready {
    pub(crate) fn new(state: Arc<StateCell>) -> Self {
        Ready { state }
    }

    pub fn signal(&self) {
        match self
            .state
            .transition(EngineState::Initialized, EngineState::Running)
        {
            Ok(()) => info!("engine running"),
            Err(e) => warn!(error = %e, "ignoring ready signal"),
        }
    }
}
