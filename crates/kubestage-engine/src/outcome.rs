//! The Status Poller's state machine (spec §4.5).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Installing,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::Failed | PollState::TimedOut | PollState::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: PollState,
    pub reason: String,
    pub captured_logs: Option<String>,
}

impl StepOutcome {
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            state: PollState::Succeeded,
            reason: "completed successfully".to_string(),
            captured_logs: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>, captured_logs: Option<String>) -> Self {
        Self {
            state: PollState::Failed,
            reason: reason.into(),
            captured_logs,
        }
    }

    #[must_use]
    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            state: PollState::TimedOut,
            reason: reason.into(),
            captured_logs: None,
        }
    }

    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            state: PollState::Cancelled,
            reason: reason.into(),
            captured_logs: None,
        }
    }
}
