use crate::error::LifecycleError;
use crate::model::LifecycleState;

/// Explicit campaign lifecycle: `Idle -> Opening -> Running -> {Finished, Stopped}`,
/// plus `Opening -> Stopped` for a stop before the subscription went through.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: LifecycleState::Idle,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn begin_opening(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Opening)
    }

    pub fn begin_running(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Running)
    }

    /// Move into a terminal state. Returns `true` only for the call that actually
    /// made the transition; the caller runs teardown exactly when this is `true`.
    pub fn terminate(&mut self, to: LifecycleState) -> bool {
        debug_assert!(to.is_terminal());
        match self.transition(to) {
            Ok(()) => true,
            Err(err) => {
                if !self.is_terminal() {
                    tracing::warn!(%err, "ignoring terminal transition");
                }
                false
            }
        }
    }

    fn transition(&mut self, to: LifecycleState) -> Result<(), LifecycleError> {
        use LifecycleState::*;
        let allowed = matches!(
            (self.state, to),
            (Idle, Opening)
                | (Idle, Stopped)
                | (Opening, Running)
                | (Opening, Stopped)
                | (Running, Finished)
                | (Running, Stopped)
        );
        if !allowed {
            return Err(LifecycleError {
                from: self.state,
                to,
            });
        }
        tracing::info!(from = ?self.state, to = ?to, "campaign lifecycle transition");
        self.state = to;
        Ok(())
    }
}
