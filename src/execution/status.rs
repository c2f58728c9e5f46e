//! Unit lifecycle states.
//!
//! ```text
//! Pending -> Running -> Succeeded | Failed
//! Running -> Terminating -> Terminated | TerminateFailed
//! Failed | Terminated | TerminateFailed -> Skipping -> Skipped
//! ```
//!
//! Callers decide whether a unit is done through [`ExecutionStatus::is_completed`] only.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Terminating,
    Terminated,
    TerminateFailed,
    Skipping,
    Skipped,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 9] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
        ExecutionStatus::Terminating,
        ExecutionStatus::Terminated,
        ExecutionStatus::TerminateFailed,
        ExecutionStatus::Skipping,
        ExecutionStatus::Skipped,
    ];

    /// True for every state the engine does not expect to leave on its own.
    ///
    /// `Failed` counts as completed even though it may still be skipped.
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::Terminated
                | ExecutionStatus::TerminateFailed
                | ExecutionStatus::Skipped
        )
    }

    /// States a skip request may start from.
    pub fn is_skippable(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Failed | ExecutionStatus::Terminated | ExecutionStatus::TerminateFailed
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match self {
            Pending => next == Running,
            Running => matches!(next, Succeeded | Failed | Terminating),
            Terminating => matches!(next, Terminated | TerminateFailed),
            Failed | Terminated | TerminateFailed => next == Skipping,
            Skipping => next == Skipped,
            Succeeded | Skipped => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Terminating => "terminating",
            ExecutionStatus::Terminated => "terminated",
            ExecutionStatus::TerminateFailed => "terminate_failed",
            ExecutionStatus::Skipping => "skipping",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
