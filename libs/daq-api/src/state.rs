use std::fmt;

/// Monotone lifecycle of a worker. Transitions only move forward:
/// `Constructed -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Constructed,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Constructed => "constructed",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

impl RunState {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Constructed, RunState::Running)
                | (RunState::Running, RunState::Stopping)
                | (RunState::Stopping, RunState::Stopped)
        )
    }
}
