use crate::execution::context::ExecutionGroupContext;
use crate::execution::unit::ExecutionUnit;
use crate::execution::{UnitInput, UnitOutput};
use std::sync::Arc;
use tracing::{debug, info};

/// Units that must not run at the same time. They run one after another, in order, on
/// whichever worker picked the sub-group up.
#[derive(Debug)]
pub struct ExecutionSubGroup<I: UnitInput, R: UnitOutput> {
    units: Vec<Arc<ExecutionUnit<I, R>>>,
}

impl<I: UnitInput, R: UnitOutput> ExecutionSubGroup<I, R> {
    pub fn new(units: Vec<Arc<ExecutionUnit<I, R>>>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[Arc<ExecutionUnit<I, R>>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Run every unit in declaration order.
    ///
    /// A failed unit does not stop the chain: later units are independent work and still run.
    /// Cancellation of the invocation stops the chain before the next unit.
    pub async fn execute(&self, context: &ExecutionGroupContext<I, R>) {
        for (position, unit) in self.units.iter().enumerate() {
            if context.is_cancelled() {
                info!(
                    unit_id = %unit.id(),
                    remaining = self.units.len() - position,
                    "Invocation cancelled, leaving remaining units of sub-group pending"
                );
                return;
            }
            unit.execute(context).await;
        }
        debug!(unit_count = self.units.len(), "Sub-group finished");
    }
}
