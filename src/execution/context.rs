//! Execution Group Context
//!
//! Shared state for one engine invocation: the unit registry, one result entry per unit,
//! the orchestration failure accumulator and progress counters. Callers keep the context
//! returned by `ExecutorEngine::execute` to poll progress and to terminate or skip units.
//!
//! Result entries each sit behind their own lock. The key set is fixed at construction, so
//! the surrounding map is never mutated and needs no lock of its own.

use crate::error::EngineError;
use crate::execution::group::ExecutionGroup;
use crate::execution::result::ExecutionResult;
use crate::execution::status::ExecutionStatus;
use crate::execution::unit::ExecutionUnit;
use crate::execution::{UnitInput, UnitOutput};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Default interval at which waiters re-check completion when no transition wakes them.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Point-in-time view of an invocation's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub invocation_id: String,
    pub total_units: usize,
    pub completed_units: usize,
    pub by_status: BTreeMap<String, usize>,
    pub total_groups: usize,
    pub completed_groups: usize,
    pub failures: usize,
    pub cancelled: bool,
    pub finished: bool,
}

pub struct ExecutionGroupContext<I: UnitInput, R: UnitOutput> {
    invocation_id: String,
    groups: Vec<Arc<ExecutionGroup<I, R>>>,
    units: HashMap<String, Arc<ExecutionUnit<I, R>>>,
    results: HashMap<String, Mutex<ExecutionResult<R>>>,
    failures: Mutex<Vec<EngineError>>,
    completed_groups: AtomicUsize,
    cancelled: AtomicBool,
    finished: AtomicBool,
    transitions: Notify,
    poll_interval: Duration,
}

impl<I: UnitInput, R: UnitOutput> ExecutionGroupContext<I, R> {
    /// Register every unit of `groups` with a `Pending` result.
    ///
    /// Unit ids must be unique across all groups.
    pub fn new(groups: Vec<ExecutionGroup<I, R>>) -> Result<Self, EngineError> {
        let mut units = HashMap::new();
        let mut results = HashMap::new();
        for group in &groups {
            for unit in group.units() {
                if units.insert(unit.id().to_string(), Arc::clone(unit)).is_some() {
                    return Err(EngineError::InvalidArgument(format!(
                        "Unit id '{}' is used more than once",
                        unit.id()
                    )));
                }
                results.insert(
                    unit.id().to_string(),
                    Mutex::new(ExecutionResult::pending(unit.order())),
                );
            }
        }

        Ok(Self {
            invocation_id: next_invocation_id(),
            groups: groups.into_iter().map(Arc::new).collect(),
            units,
            results,
            failures: Mutex::new(Vec::new()),
            completed_groups: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            transitions: Notify::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn groups(&self) -> &[Arc<ExecutionGroup<I, R>>] {
        &self.groups
    }

    /// Every unit, group by group, in declaration order.
    pub fn list_all_execution_units(&self) -> Vec<Arc<ExecutionUnit<I, R>>> {
        self.groups
            .iter()
            .flat_map(|group| group.units().iter().cloned())
            .collect()
    }

    pub fn get_unit(&self, id: &str) -> Option<Arc<ExecutionUnit<I, R>>> {
        self.units.get(id).cloned()
    }

    pub fn get_execution_result(&self, id: &str) -> Option<ExecutionResult<R>> {
        self.results.get(id).map(|entry| entry.lock().clone())
    }

    pub fn status_of(&self, id: &str) -> Option<ExecutionStatus> {
        self.results.get(id).map(|entry| entry.lock().status)
    }

    /// Atomically update the result of unit `id`.
    ///
    /// `update` runs while holding only that unit's lock and sees the current value; whatever
    /// it leaves behind is the new value. Unknown ids are rejected: units cannot be added after
    /// construction.
    pub fn set_execution_result<T>(
        &self,
        id: &str,
        update: impl FnOnce(&mut ExecutionResult<R>) -> T,
    ) -> Result<T, EngineError> {
        let entry = self
            .results
            .get(id)
            .ok_or_else(|| EngineError::UnknownUnit(id.to_string()))?;

        let mut result = entry.lock();
        let before = result.status;
        let output = update(&mut result);
        let changed = result.status != before;
        drop(result);

        if changed {
            self.transitions.notify_waiters();
        }
        Ok(output)
    }

    /// All results ordered by unit `order`, then id.
    pub fn list_results(&self) -> Vec<(String, ExecutionResult<R>)> {
        let mut results: Vec<_> = self
            .results
            .iter()
            .map(|(id, entry)| (id.clone(), entry.lock().clone()))
            .collect();
        results.sort_by(|(a_id, a), (b_id, b)| {
            a.order.cmp(&b.order).then_with(|| a_id.cmp(b_id))
        });
        results
    }

    /// True when every unit is in a completed state.
    pub fn is_completed(&self) -> bool {
        self.results
            .values()
            .all(|entry| entry.lock().status.is_completed())
    }

    pub async fn terminate(&self, id: &str) -> Result<ExecutionStatus, EngineError> {
        let unit = self
            .get_unit(id)
            .ok_or_else(|| EngineError::UnknownUnit(id.to_string()))?;
        unit.terminate(self).await
    }

    pub fn skip(&self, id: &str) -> Result<ExecutionStatus, EngineError> {
        let unit = self
            .get_unit(id)
            .ok_or_else(|| EngineError::UnknownUnit(id.to_string()))?;
        unit.skip(self)
    }

    /// Record an orchestration-level failure. Unit failures live in unit results instead.
    pub fn add_failure(&self, error: EngineError) {
        self.failures.lock().push(error);
    }

    pub fn failures(&self) -> Vec<EngineError> {
        self.failures.lock().clone()
    }

    pub fn increase_completed_group_count(&self) -> usize {
        self.completed_groups.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn completed_group_count(&self) -> usize {
        self.completed_groups.load(Ordering::Acquire)
    }

    /// Cancel the whole invocation. Running handlers observe it through
    /// `Invocation::should_stop`; units not yet started stay `Pending`.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            info!(invocation_id = %self.invocation_id, "Invocation cancelled");
            self.transitions.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the orchestrator has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
        self.transitions.notify_waiters();
    }

    /// Wait until the orchestrator has returned.
    pub async fn wait(&self) {
        loop {
            let notified = self.transitions.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_finished() {
                return;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`. Returns whether the
    /// orchestrator finished.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.wait()).await.is_err() {
            warn!(
                invocation_id = %self.invocation_id,
                timeout_ms = timeout.as_millis() as u64,
                "Timed out waiting for invocation"
            );
            return false;
        }
        true
    }

    pub fn progress(&self) -> ProgressSnapshot {
        let mut by_status = BTreeMap::new();
        let mut completed_units = 0;
        for entry in self.results.values() {
            let status = entry.lock().status;
            if status.is_completed() {
                completed_units += 1;
            }
            *by_status.entry(status.as_str().to_string()).or_insert(0) += 1;
        }
        ProgressSnapshot {
            invocation_id: self.invocation_id.clone(),
            total_units: self.results.len(),
            completed_units,
            by_status,
            total_groups: self.groups.len(),
            completed_groups: self.completed_group_count(),
            failures: self.failures.lock().len(),
            cancelled: self.is_cancelled(),
            finished: self.is_finished(),
        }
    }

    pub(crate) fn transitions(&self) -> &Notify {
        &self.transitions
    }
}

fn next_invocation_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("exec-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
