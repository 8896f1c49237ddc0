//! Execution task state machine

use serde::{Deserialize, Serialize};

/// Possible states of an execution task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet submitted
    Pending,

    /// Waiting in the executor queue
    Queued,

    /// Currently running on a worker (or inline for sync execution)
    Running,

    /// Failed once, waiting for the backoff delay before re-queueing
    Retrying,

    /// Completed successfully
    Completed,

    /// Failed permanently (retries exhausted or non-retryable error)
    Failed,

    /// Cancelled by `cancel_execution` or shutdown
    Cancelled,

    /// Exceeded its deadline on the final attempt
    Timeout,
}

impl TaskStatus {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }

    /// Check if task is waiting for a worker
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Retrying
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Queued => "Queued",
            TaskStatus::Running => "Running",
            TaskStatus::Retrying => "Retrying",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
            TaskStatus::Timeout => "Timeout",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
        assert!(TaskStatus::Retrying.is_pending());
        assert_eq!(TaskStatus::Cancelled.to_string(), "Cancelled");
    }
}
