//! Executor Engine
//!
//! Facade that owns the worker pool, accepts a batch of groups and returns the invocation's
//! context right away. Groups run one after another; sub-groups of a group run concurrently.

pub mod pool;
pub mod shutdown;

pub use pool::WorkerPool;
pub use shutdown::ShutdownService;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::execution::{ExecutionGroup, ExecutionGroupContext, UnitInput, UnitOutput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ExecutorEngine {
    pool: Arc<WorkerPool>,
    shutdown: Arc<ShutdownService>,
    poll_interval: Duration,
    shutdown_grace: Duration,
    closed: AtomicBool,
}

impl ExecutorEngine {
    /// Engine with `pool_size` workers (`0` = cached) and default settings otherwise.
    pub fn new(pool_size: usize) -> Result<Self, EngineError> {
        Self::from_config(&EngineConfig {
            pool_size,
            ..EngineConfig::default()
        })
    }

    /// Engine with its own shutdown service.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let shutdown = Arc::new(ShutdownService::start()?);
        Self::with_shutdown_service(config, shutdown)
    }

    /// Engine whose pool is shut down by an existing `shutdown` service.
    pub fn with_shutdown_service(
        config: &EngineConfig,
        shutdown: Arc<ShutdownService>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = WorkerPool::new(config.pool_size, &config.worker_thread_name)?;
        info!(
            pool_size = config.pool_size,
            poll_interval_ms = config.poll_interval_ms,
            "Executor engine started"
        );
        Ok(Self {
            pool: Arc::new(pool),
            shutdown,
            poll_interval: config.poll_interval(),
            shutdown_grace: config.shutdown_grace(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Start executing `groups` in the background and return the invocation's context.
    ///
    /// Fails only for an empty batch, duplicate unit ids or a closed engine; everything that
    /// goes wrong later is recorded in the context.
    pub fn execute<I: UnitInput, R: UnitOutput>(
        &self,
        groups: Vec<ExecutionGroup<I, R>>,
    ) -> Result<Arc<ExecutionGroupContext<I, R>>, EngineError> {
        if groups.is_empty() {
            return Err(EngineError::InvalidArgument(
                "At least one execution group is required".to_string(),
            ));
        }
        if self.is_closed() {
            return Err(EngineError::PoolClosed);
        }

        let context =
            Arc::new(ExecutionGroupContext::new(groups)?.with_poll_interval(self.poll_interval));
        self.pool
            .spawn(orchestrate(Arc::clone(&self.pool), Arc::clone(&context)))?;

        info!(
            invocation_id = %context.invocation_id(),
            group_count = context.groups().len(),
            unit_count = context.list_all_execution_units().len(),
            "Execution submitted"
        );
        Ok(context)
    }

    /// Stop accepting work and shut the pool down in the background.
    ///
    /// Never blocks. In-flight tasks get the configured grace period before the runtime is
    /// shut down forcibly. Calling `close` again is a no-op.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(detached) = self.pool.detach() else {
            return Ok(());
        };
        info!(
            in_flight = detached.in_flight.count(),
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "Closing executor engine"
        );
        self.shutdown
            .submit("executor-engine".to_string(), detached, self.shutdown_grace)
    }
}

impl Drop for ExecutorEngine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to close executor engine");
        }
    }
}

/// Marks the context finished however the orchestrator exits, including being dropped by a
/// forced pool shutdown.
struct FinishGuard<I: UnitInput, R: UnitOutput>(Arc<ExecutionGroupContext<I, R>>);

impl<I: UnitInput, R: UnitOutput> Drop for FinishGuard<I, R> {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

/// Run groups one after another, each as its own task on the pool.
async fn orchestrate<I: UnitInput, R: UnitOutput>(
    pool: Arc<WorkerPool>,
    context: Arc<ExecutionGroupContext<I, R>>,
) {
    let _finish = FinishGuard(Arc::clone(&context));
    let invocation_id = context.invocation_id().to_string();

    for (group_index, group) in context.groups().iter().enumerate() {
        if context.is_cancelled() {
            context.add_failure(EngineError::Cancelled);
            break;
        }

        let task_group = Arc::clone(group);
        let task_pool = Arc::clone(&pool);
        let task_context = Arc::clone(&context);
        let outcome = match pool.spawn(async move {
            task_group.execute(&task_pool, &task_context).await
        }) {
            Ok(handle) => handle
                .await
                .map_err(EngineError::from)
                .and_then(|result| result),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                let completed_groups = context.increase_completed_group_count();
                info!(
                    invocation_id = %invocation_id,
                    group_index,
                    group = %group.name(),
                    completed_groups,
                    "Group completed"
                );
            }
            Err(EngineError::Cancelled) => {
                warn!(
                    invocation_id = %invocation_id,
                    group_index,
                    "Execution cancelled while waiting for group"
                );
                context.add_failure(EngineError::Cancelled);
                break;
            }
            Err(err) => {
                error!(
                    invocation_id = %invocation_id,
                    group_index,
                    group = %group.name(),
                    error = %err,
                    "Group execution failed"
                );
                context.add_failure(err);
            }
        }
    }

    info!(
        invocation_id = %invocation_id,
        completed = context.is_completed(),
        completed_groups = context.completed_group_count(),
        "Execution finished"
    );
}
