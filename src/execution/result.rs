use crate::execution::status::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status and payload of one unit inside a context.
///
/// Only ever touched through `ExecutionGroupContext::set_execution_result`, which holds the
/// unit's lock for the duration of the update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult<R> {
    pub status: ExecutionStatus,
    /// Copied from the owning unit; used for result ordering only.
    pub order: i64,
    /// Handler output. Attached even when a termination raced the handler.
    pub value: Option<R>,
    /// Message of the last handler failure, if any.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl<R> ExecutionResult<R> {
    pub fn pending(order: i64) -> Self {
        Self {
            status: ExecutionStatus::Pending,
            order,
            value: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Move to `next`, stamping start/finish times. Returns false and leaves the result untouched
    /// if the edge is not part of the lifecycle.
    pub(crate) fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        let now = Utc::now();
        if next == ExecutionStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_completed() {
            self.finished_at = Some(now);
        }
        true
    }
}
