use serde::{Deserialize, Serialize};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created but not started
    Idle,
    /// Capturing and dispatching chunks
    Recording,
    /// Capture suspended, buffered audio retained
    Paused,
    /// Teardown in progress: timer cancelled, in-flight work draining
    Stopping,
    /// Terminal; a new session needs a new controller
    Stopped,
}

impl SessionState {
    /// Recording or Paused: the session holds the device and the subject slot.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Paused)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, SessionState::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Paused => "paused",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_states() {
        assert!(SessionState::Recording.is_live());
        assert!(SessionState::Paused.is_live());
        assert!(!SessionState::Idle.is_live());
        assert!(!SessionState::Stopping.is_live());
        assert!(!SessionState::Stopped.is_live());
    }

    #[test]
    fn transition_guards() {
        assert!(SessionState::Recording.can_pause());
        assert!(!SessionState::Paused.can_pause());
        assert!(SessionState::Paused.can_resume());
        assert!(!SessionState::Recording.can_resume());
        assert!(SessionState::Stopped.is_terminal());
    }
}
