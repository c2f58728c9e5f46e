//! Execution unit: the smallest schedulable piece of work and its state transitions.
//!
//! Every transition is a compute-style update on the unit's entry in the context. Handler
//! callbacks always run outside that update, so a slow handler never blocks readers.

use crate::error::EngineError;
use crate::execution::context::ExecutionGroupContext;
use crate::execution::handler::{Invocation, UnitHandler};
use crate::execution::result::ExecutionResult;
use crate::execution::status::ExecutionStatus;
use crate::execution::{UnitInput, UnitOutput};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ExecutionUnit<I: UnitInput, R: UnitOutput> {
    id: String,
    order: i64,
    handler: Arc<dyn UnitHandler<I, R>>,
    input: I,
}

impl<I: UnitInput, R: UnitOutput> ExecutionUnit<I, R> {
    pub fn new(
        id: impl Into<String>,
        order: i64,
        handler: Arc<dyn UnitHandler<I, R>>,
        input: I,
    ) -> Self {
        Self {
            id: id.into(),
            order,
            handler,
            input,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    /// Claim the unit (`Pending -> Running`) and run its handler.
    ///
    /// A unit that was already claimed, or that is not part of `context`, is left alone.
    /// Handler errors and panics become `Failed`; if the unit was moved to `Terminating` while
    /// the handler ran, that status is kept and only the value or error is attached.
    pub async fn execute(&self, context: &ExecutionGroupContext<I, R>) {
        let claimed = match context
            .set_execution_result(&self.id, |result| result.transition(ExecutionStatus::Running))
        {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(unit_id = %self.id, error = %err, "Cannot execute unit");
                return;
            }
        };
        if !claimed {
            debug!(unit_id = %self.id, "Unit already claimed, not executing");
            return;
        }
        info!(unit_id = %self.id, status = %ExecutionStatus::Running, "Unit started");

        let invocation = Invocation::new(self, context);
        self.run_before_execute(&invocation).await;

        let outcome = AssertUnwindSafe(self.handler.execute(&invocation))
            .catch_unwind()
            .await;
        let (status, error) = match outcome {
            Ok(Ok(value)) => {
                let status = self.update(context, |result| {
                    result.value = Some(value);
                    if result.status == ExecutionStatus::Running {
                        result.transition(ExecutionStatus::Succeeded);
                    }
                    result.status
                });
                (status, None)
            }
            Ok(Err(err)) => {
                let message = format!("{:#}", err);
                (self.record_failure(context, message.clone()), Some(message))
            }
            Err(panic) => {
                let message = panic_message(panic);
                (self.record_failure(context, message.clone()), Some(message))
            }
        };

        match (status, error) {
            (Some(ExecutionStatus::Failed), Some(error)) => {
                warn!(
                    unit_id = %self.id,
                    status = %ExecutionStatus::Failed,
                    error = %error,
                    "Unit failed"
                );
            }
            (Some(status), Some(error)) => {
                warn!(
                    unit_id = %self.id,
                    status = %status,
                    error = %error,
                    "Unit handler failed after termination was requested"
                );
            }
            (Some(status), None) => {
                info!(unit_id = %self.id, status = %status, "Unit finished");
            }
            (None, _) => {}
        }
    }

    /// Run the handler's `before_execute` hook. Failures are logged and swallowed.
    pub async fn before_execute(&self, context: &ExecutionGroupContext<I, R>) {
        let invocation = Invocation::new(self, context);
        self.run_before_execute(&invocation).await;
    }

    /// Terminate a running unit (`Running -> Terminating -> Terminated | TerminateFailed`).
    ///
    /// Returns `InvalidState` without touching the unit if it is not `Running`. Dropping the
    /// returned future before the handler finished leaves the unit `TerminateFailed`.
    pub async fn terminate(
        &self,
        context: &ExecutionGroupContext<I, R>,
    ) -> Result<ExecutionStatus, EngineError> {
        context
            .set_execution_result(&self.id, |result| {
                if result.status == ExecutionStatus::Running {
                    result.transition(ExecutionStatus::Terminating);
                    Ok(())
                } else {
                    Err(result.status)
                }
            })?
            .map_err(|status| EngineError::InvalidState {
                id: self.id.clone(),
                operation: "terminate",
                status,
            })?;
        info!(unit_id = %self.id, status = %ExecutionStatus::Terminating, "Unit terminating");
        let mut guard = TerminationGuard {
            unit_id: &self.id,
            context,
            armed: true,
        };

        let invocation = Invocation::new(self, context);
        let outcome = AssertUnwindSafe(self.handler.terminate(&invocation))
            .catch_unwind()
            .await;
        let (next, error) = match outcome {
            Ok(Ok(())) => (ExecutionStatus::Terminated, None),
            Ok(Err(err)) => (ExecutionStatus::TerminateFailed, Some(format!("{:#}", err))),
            Err(panic) => (ExecutionStatus::TerminateFailed, Some(panic_message(panic))),
        };

        guard.armed = false;
        let status = context.set_execution_result(&self.id, |result| {
            if result.status == ExecutionStatus::Terminating {
                result.transition(next);
                if error.is_some() {
                    result.error = error.clone();
                }
            }
            result.status
        })?;

        match error {
            Some(error) => {
                warn!(
                    unit_id = %self.id,
                    status = %status,
                    error = %error,
                    "Unit termination failed"
                )
            }
            None => info!(unit_id = %self.id, status = %status, "Unit terminated"),
        }
        Ok(status)
    }

    /// Skip a failed or terminated unit (`-> Skipping -> Skipped`).
    ///
    /// Any other status is returned unchanged; skipping twice is a no-op.
    pub fn skip(
        &self,
        context: &ExecutionGroupContext<I, R>,
    ) -> Result<ExecutionStatus, EngineError> {
        let (entered, current) = context.set_execution_result(&self.id, |result| {
            let entered =
                result.status.is_skippable() && result.transition(ExecutionStatus::Skipping);
            (entered, result.status)
        })?;
        if !entered {
            return Ok(current);
        }
        debug!(unit_id = %self.id, status = %ExecutionStatus::Skipping, "Unit skipping");

        let status = context.set_execution_result(&self.id, |result| {
            if result.status == ExecutionStatus::Skipping {
                result.transition(ExecutionStatus::Skipped);
            }
            result.status
        })?;
        info!(unit_id = %self.id, status = %status, "Unit skipped");
        Ok(status)
    }

    async fn run_before_execute(&self, invocation: &Invocation<'_, I, R>) {
        let outcome = AssertUnwindSafe(self.handler.before_execute(invocation))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let error = format!("{:#}", err);
                warn!(unit_id = %self.id, error = %error, "before_execute hook failed")
            }
            Err(panic) => {
                let error = panic_message(panic);
                warn!(unit_id = %self.id, error = %error, "before_execute hook panicked")
            }
        }
    }

    fn record_failure(
        &self,
        context: &ExecutionGroupContext<I, R>,
        message: String,
    ) -> Option<ExecutionStatus> {
        self.update(context, |result| {
            if result.status == ExecutionStatus::Running {
                result.transition(ExecutionStatus::Failed);
            }
            result.error = Some(message);
            result.status
        })
    }

    /// Update for a unit that is known to be claimed in `context`.
    fn update<T>(
        &self,
        context: &ExecutionGroupContext<I, R>,
        f: impl FnOnce(&mut ExecutionResult<R>) -> T,
    ) -> Option<T> {
        match context.set_execution_result(&self.id, f) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(unit_id = %self.id, error = %err, "Lost track of unit result");
                None
            }
        }
    }
}

/// Settles a unit left `Terminating` when the caller drops `terminate` before the handler
/// returned, so the unit still reaches a completed state.
struct TerminationGuard<'a, I: UnitInput, R: UnitOutput> {
    unit_id: &'a str,
    context: &'a ExecutionGroupContext<I, R>,
    armed: bool,
}

impl<I: UnitInput, R: UnitOutput> Drop for TerminationGuard<'_, I, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let abandoned = self.context.set_execution_result(self.unit_id, |result| {
            if result.status != ExecutionStatus::Terminating {
                return false;
            }
            result.transition(ExecutionStatus::TerminateFailed);
            result.error = Some("termination abandoned before the handler returned".to_string());
            true
        });
        if let Ok(true) = abandoned {
            warn!(
                unit_id = %self.unit_id,
                status = %ExecutionStatus::TerminateFailed,
                "Termination dropped before completion"
            );
        }
    }
}

impl<I: UnitInput, R: UnitOutput> fmt::Debug for ExecutionUnit<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("id", &self.id)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
