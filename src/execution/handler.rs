//! The work a unit performs, supplied by the caller.

use crate::execution::context::ExecutionGroupContext;
use crate::execution::status::ExecutionStatus;
use crate::execution::unit::ExecutionUnit;
use crate::execution::{UnitInput, UnitOutput};
use async_trait::async_trait;

/// Per-unit work. One handler may be shared by many units; the unit's input tells them apart.
///
/// Errors returned from `execute` or `terminate` are recorded on the unit's result and never
/// reach the orchestrator or sibling units. There is no retry at this layer.
#[async_trait]
pub trait UnitHandler<I: UnitInput, R: UnitOutput>: Send + Sync {
    /// Best-effort hook run after the unit is claimed and before `execute`.
    /// Failures are logged and otherwise ignored.
    async fn before_execute(&self, _invocation: &Invocation<'_, I, R>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&self, invocation: &Invocation<'_, I, R>) -> anyhow::Result<R>;

    /// Called when a caller terminates the running unit. Implementations signal their own
    /// `execute` to stop; `execute` should poll [`Invocation::should_stop`].
    async fn terminate(&self, _invocation: &Invocation<'_, I, R>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// View of a unit and its context handed to handler callbacks.
pub struct Invocation<'a, I: UnitInput, R: UnitOutput> {
    unit: &'a ExecutionUnit<I, R>,
    context: &'a ExecutionGroupContext<I, R>,
}

impl<'a, I: UnitInput, R: UnitOutput> Invocation<'a, I, R> {
    pub(crate) fn new(
        unit: &'a ExecutionUnit<I, R>,
        context: &'a ExecutionGroupContext<I, R>,
    ) -> Self {
        Self { unit, context }
    }

    pub fn unit_id(&self) -> &str {
        self.unit.id()
    }

    pub fn order(&self) -> i64 {
        self.unit.order()
    }

    pub fn input(&self) -> &I {
        self.unit.input()
    }

    pub fn context(&self) -> &ExecutionGroupContext<I, R> {
        self.context
    }

    /// Current status of this unit.
    pub fn status(&self) -> ExecutionStatus {
        self.context
            .status_of(self.unit.id())
            .unwrap_or(ExecutionStatus::Pending)
    }

    /// True once termination was requested, including after it already finished.
    pub fn is_terminating(&self) -> bool {
        matches!(
            self.status(),
            ExecutionStatus::Terminating
                | ExecutionStatus::Terminated
                | ExecutionStatus::TerminateFailed
        )
    }

    /// True once the unit is being terminated or the whole invocation was cancelled.
    pub fn should_stop(&self) -> bool {
        self.is_terminating() || self.context.is_cancelled()
    }
}
