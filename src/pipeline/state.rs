//! Pipeline state management

use log::warn;
use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline state machine
///
/// Both pipelines walk the same lifecycle. Stopped is terminal: a pipeline
/// instance is never restarted, a new one is constructed for a new session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, nothing acquired yet
    Idle = 0,

    /// Device/stream configuration in progress
    Configuring = 1,

    /// Worker thread is processing media
    Running = 2,

    /// Cancellation signalled, waiting for the worker to exit
    Stopping = 3,

    /// Worker joined (or abandoned); terminal
    Stopped = 4,
}

impl PipelineState {
    /// Convert from u8 value. Returns Stopped for invalid values.
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Configuring,
            2 => PipelineState::Running,
            3 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }

    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, Configuring) => true,

            (Configuring, Running) => true,
            (Configuring, Stopping) => true, // Can abort configuration

            (Running, Stopping) => true,

            (Stopping, Stopped) => true,

            // Stopped is terminal
            (Stopped, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Configuring => "Configuring",
            PipelineState::Running => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Stopping)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Atomic cell holding a [`PipelineState`], readable from any thread.
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new(initial: PipelineState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Transition to `target`, validating against the state machine.
    ///
    /// Invalid transitions are refused and logged; returns whether the
    /// transition was applied.
    pub fn set(&self, target: PipelineState) -> bool {
        let current = self.get();
        if !current.can_transition_to(&target) {
            warn!("refusing pipeline state transition {current} -> {target}");
            return false;
        }
        self.state.store(target as u8, Ordering::Release);
        true
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(PipelineState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use PipelineState::*;

        assert!(Idle.can_transition_to(&Configuring));
        assert!(Configuring.can_transition_to(&Running));
        assert!(Configuring.can_transition_to(&Stopping));
        assert!(Running.can_transition_to(&Stopping));
        assert!(Stopping.can_transition_to(&Stopped));

        // Self-transitions
        assert!(Idle.can_transition_to(&Idle));
        assert!(Running.can_transition_to(&Running));
    }

    #[test]
    fn test_invalid_transitions() {
        use PipelineState::*;

        assert!(!Idle.can_transition_to(&Running)); // Must go through Configuring
        assert!(!Idle.can_transition_to(&Stopped));
        assert!(!Stopped.can_transition_to(&Running)); // Can't restart after stopped
        assert!(!Stopped.can_transition_to(&Idle));
        assert!(!Running.can_transition_to(&Configuring));
    }

    #[test]
    fn test_state_cell_refuses_invalid() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), PipelineState::Idle);

        assert!(cell.set(PipelineState::Configuring));
        assert!(cell.set(PipelineState::Running));
        assert!(!cell.set(PipelineState::Configuring));
        assert_eq!(cell.get(), PipelineState::Running);

        assert!(cell.set(PipelineState::Stopping));
        assert!(cell.set(PipelineState::Stopped));
        assert!(!cell.set(PipelineState::Running));
        assert_eq!(cell.get(), PipelineState::Stopped);
    }
}
