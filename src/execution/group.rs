//! Execution group: a partition of units into sub-groups that run concurrently.

use crate::engine::WorkerPool;
use crate::error::EngineError;
use crate::execution::context::ExecutionGroupContext;
use crate::execution::status::ExecutionStatus;
use crate::execution::sub_group::ExecutionSubGroup;
use crate::execution::unit::ExecutionUnit;
use crate::execution::{UnitInput, UnitOutput};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Splits a flat unit list into sub-groups.
///
/// Units that must not run concurrently belong in the same sub-group, in the order they must
/// run; everything else may be split apart to run in parallel.
pub trait GroupingStrategy<I: UnitInput, R: UnitOutput>: Send + Sync {
    fn list_sub_groups(
        &self,
        units: &[Arc<ExecutionUnit<I, R>>],
    ) -> Result<Vec<ExecutionSubGroup<I, R>>, EngineError>;
}

pub struct ExecutionGroup<I: UnitInput, R: UnitOutput> {
    name: String,
    units: Vec<Arc<ExecutionUnit<I, R>>>,
    sub_groups: Vec<Arc<ExecutionSubGroup<I, R>>>,
}

impl<I: UnitInput, R: UnitOutput> ExecutionGroup<I, R> {
    /// Build a group, letting `strategy` compute the sub-groups once.
    ///
    /// The strategy's output must place every unit in exactly one sub-group.
    pub fn new(
        name: impl Into<String>,
        units: Vec<ExecutionUnit<I, R>>,
        strategy: &dyn GroupingStrategy<I, R>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        let units: Vec<_> = units.into_iter().map(Arc::new).collect();

        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(units.len());
        for unit in &units {
            if seen.insert(unit.id(), 0).is_some() {
                return Err(EngineError::InvalidArgument(format!(
                    "Group '{}' contains unit '{}' more than once",
                    name,
                    unit.id()
                )));
            }
        }

        let sub_groups: Vec<_> = strategy
            .list_sub_groups(&units)?
            .into_iter()
            .filter(|sub_group| !sub_group.is_empty())
            .collect();

        for unit in sub_groups.iter().flat_map(|sub_group| sub_group.units()) {
            match seen.get_mut(unit.id()) {
                Some(count) => *count += 1,
                None => {
                    return Err(EngineError::InvalidArgument(format!(
                        "Grouping of '{}' produced unknown unit '{}'",
                        name,
                        unit.id()
                    )))
                }
            }
        }
        if let Some((id, count)) = seen.iter().find(|(_, count)| **count != 1) {
            return Err(EngineError::InvalidArgument(format!(
                "Grouping of '{}' placed unit '{}' in {} sub-groups",
                name, id, count
            )));
        }

        Ok(Self {
            name,
            units,
            sub_groups: sub_groups.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[Arc<ExecutionUnit<I, R>>] {
        &self.units
    }

    pub fn sub_groups(&self) -> &[Arc<ExecutionSubGroup<I, R>>] {
        &self.sub_groups
    }

    /// True once every unit of this group is in a completed state.
    pub fn is_completed(&self, context: &ExecutionGroupContext<I, R>) -> bool {
        self.units.iter().all(|unit| {
            context
                .status_of(unit.id())
                .map(|status| status.is_completed())
                .unwrap_or(false)
        })
    }

    /// Submit every sub-group to `pool` and wait until all units of the group completed.
    ///
    /// Returns `Cancelled` if the invocation is cancelled while waiting.
    pub async fn execute(
        &self,
        pool: &WorkerPool,
        context: &Arc<ExecutionGroupContext<I, R>>,
    ) -> Result<(), EngineError> {
        let mut tasks = FuturesUnordered::new();
        for sub_group in &self.sub_groups {
            let sub_group = Arc::clone(sub_group);
            let context = Arc::clone(context);
            let handle = pool.spawn_bounded(async move { sub_group.execute(&context).await })?;
            tasks.push(handle);
        }
        debug!(
            group = %self.name,
            sub_group_count = self.sub_groups.len(),
            unit_count = self.units.len(),
            "Submitted sub-groups"
        );

        self.wait_until_completed(context, &mut tasks).await
    }

    async fn wait_until_completed(
        &self,
        context: &ExecutionGroupContext<I, R>,
        tasks: &mut FuturesUnordered<tokio::task::JoinHandle<()>>,
    ) -> Result<(), EngineError> {
        let poll_interval = context.poll_interval();
        loop {
            // Register before checking so a transition between check and await is not lost.
            let notified = context.transitions().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if context.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.is_completed(context) {
                return Ok(());
            }
            if tasks.is_empty() && self.has_orphaned_units(context) {
                return Err(EngineError::TaskFailed(format!(
                    "Group '{}' sub-groups stopped before running all units",
                    self.name
                )));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll_interval) => {}
                Some(joined) = tasks.next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        let err = EngineError::from(err);
                        warn!(group = %self.name, error = %err, "Sub-group task failed");
                        context.add_failure(err);
                    }
                }
            }
        }
    }

    /// Units no sub-group task claimed although none is left to run them.
    ///
    /// Claimed but unfinished units may still be settled by a terminate request, so only the
    /// unclaimed state counts here.
    fn has_orphaned_units(&self, context: &ExecutionGroupContext<I, R>) -> bool {
        self.units
            .iter()
            .any(|unit| context.status_of(unit.id()) == Some(ExecutionStatus::Pending))
    }
}
