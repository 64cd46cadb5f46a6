//! Session lifecycle

use std::time::Instant;

/// Where a playback session is in its one-way lifecycle
///
/// A coordinator plays a single file: once the session reaches `Stopped` it
/// is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing opened yet
    Idle,

    /// Opening the source, decoders and audio device
    Initializing,

    /// Dispatch loop is running
    Running {
        /// When playback started
        started_at: Instant,
    },

    /// End of stream or fatal error reached, tearing down
    Stopping,

    /// Session torn down, cannot be restarted
    Stopped,
}

impl PipelineState {
    /// Whether the session may move from this state to `target`
    ///
    /// The only way out of `Initializing` besides playing is a failed open,
    /// which goes straight to `Stopping`. Staying put is always allowed;
    /// leaving `Stopped` never is.
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Stopped, _) => false,
            (Idle, Initializing)
            | (Initializing, Running { .. } | Stopping)
            | (Running { .. }, Stopping)
            | (Stopping, Stopped) => true,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }

    /// Phase name used in transition logs and errors
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Initializing => "opening media",
            PipelineState::Running { .. } => "playing",
            PipelineState::Stopping => "draining",
            PipelineState::Stopped => "finished",
        }
    }

    /// Time spent playing so far, `None` outside `Running`
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        match self {
            PipelineState::Running { started_at } => Some(started_at.elapsed()),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_lifecycle() {
        let idle = PipelineState::Idle;
        let initializing = PipelineState::Initializing;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let stopping = PipelineState::Stopping;
        let stopped = PipelineState::Stopped;

        assert!(idle.can_transition_to(&initializing));
        assert!(initializing.can_transition_to(&running));
        assert!(running.can_transition_to(&stopping));
        assert!(stopping.can_transition_to(&stopped));

        // setup failure skips Running
        assert!(initializing.can_transition_to(&stopping));

        assert!(idle.can_transition_to(&idle));
        assert!(running.can_transition_to(&running));
    }

    #[test]
    fn test_invalid_transitions() {
        let idle = PipelineState::Idle;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let stopped = PipelineState::Stopped;

        assert!(!idle.can_transition_to(&running));
        assert!(!idle.can_transition_to(&stopped));
        assert!(!running.can_transition_to(&stopped));
        assert!(!stopped.can_transition_to(&running));
        assert!(!stopped.can_transition_to(&idle));
    }

    #[test]
    fn test_running_restamp_is_not_a_transition_error() {
        let first = PipelineState::Running {
            started_at: Instant::now(),
        };
        let later = PipelineState::Running {
            started_at: Instant::now() + std::time::Duration::from_millis(5),
        };

        assert!(first.can_transition_to(&later));
        assert!(!PipelineState::Stopped.can_transition_to(&PipelineState::Stopped));
    }

    #[test]
    fn test_phase_names() {
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };

        assert!(running.running_duration().is_some());
        assert_eq!(PipelineState::Initializing.running_duration(), None);
        assert_eq!(PipelineState::Initializing.to_string(), "opening media");
        assert_eq!(running.to_string(), "playing");
        assert_eq!(PipelineState::Stopping.to_string(), "draining");
        assert_eq!(PipelineState::Stopped.to_string(), "finished");
    }
}
