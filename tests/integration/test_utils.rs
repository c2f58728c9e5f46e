//! Shared test utilities for integration tests
//!
//! A single configurable handler covers every behaviour the scenarios need: sleeping, failing,
//! panicking and blocking until stopped.

use async_trait::async_trait;
use groupexec::config::EngineConfig;
use groupexec::engine::ExecutorEngine;
use groupexec::execution::{
    ExecutionGroup, ExecutionGroupContext, ExecutionStatus, ExecutionUnit, GroupingStrategy,
    Invocation, UnitHandler,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct TestWork {
    pub delay: Duration,
    pub fail: bool,
    pub panic: bool,
    /// Run until terminated or cancelled.
    pub block: bool,
}

impl TestWork {
    pub fn quick() -> Self {
        Self::default()
    }

    pub fn sleep(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            ..Self::default()
        }
    }

    pub fn failing(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            fail: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    pub fn blocking() -> Self {
        Self {
            block: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
pub struct TestHandler {
    started: Mutex<Vec<String>>,
    calls: AtomicUsize,
    before_execute_fails: bool,
    terminate_fails: bool,
    terminate_delay: Duration,
}

impl TestHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_before_execute() -> Arc<Self> {
        Arc::new(Self {
            before_execute_fails: true,
            ..Self::default()
        })
    }

    pub fn slow_terminate(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            terminate_delay: delay,
            ..Self::default()
        })
    }

    pub fn failing_terminate() -> Arc<Self> {
        Arc::new(Self {
            terminate_fails: true,
            ..Self::default()
        })
    }

    /// Unit ids in the order their handlers started.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitHandler<TestWork, String> for TestHandler {
    async fn before_execute(
        &self,
        invocation: &Invocation<'_, TestWork, String>,
    ) -> anyhow::Result<()> {
        if self.before_execute_fails {
            anyhow::bail!("before_execute failed for {}", invocation.unit_id());
        }
        Ok(())
    }

    async fn execute(
        &self,
        invocation: &Invocation<'_, TestWork, String>,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push(invocation.unit_id().to_string());
        let work = invocation.input();

        if work.panic {
            panic!("boom in {}", invocation.unit_id());
        }
        if work.block {
            while !invocation.should_stop() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            return Ok(format!("stopped {}", invocation.unit_id()));
        }
        tokio::time::sleep(work.delay).await;
        if work.fail {
            anyhow::bail!("unit {} failed", invocation.unit_id());
        }
        Ok(format!("done {}", invocation.unit_id()))
    }

    async fn terminate(&self, invocation: &Invocation<'_, TestWork, String>) -> anyhow::Result<()> {
        tokio::time::sleep(self.terminate_delay).await;
        if self.terminate_fails {
            anyhow::bail!("cannot terminate {}", invocation.unit_id());
        }
        Ok(())
    }
}

pub fn unit(
    handler: &Arc<TestHandler>,
    id: &str,
    order: i64,
    work: TestWork,
) -> ExecutionUnit<TestWork, String> {
    let handler: Arc<dyn UnitHandler<TestWork, String>> = handler.clone();
    ExecutionUnit::new(id, order, handler, work)
}

pub fn group(
    name: &str,
    units: Vec<ExecutionUnit<TestWork, String>>,
    strategy: &dyn GroupingStrategy<TestWork, String>,
) -> ExecutionGroup<TestWork, String> {
    ExecutionGroup::new(name, units, strategy).unwrap()
}

pub fn test_config(pool_size: usize) -> EngineConfig {
    EngineConfig {
        pool_size,
        poll_interval_ms: 10,
        shutdown_grace_ms: 1_000,
        ..EngineConfig::default()
    }
}

pub fn engine(pool_size: usize) -> ExecutorEngine {
    ExecutorEngine::from_config(&test_config(pool_size)).unwrap()
}

/// Poll until unit `id` reaches `status` or `timeout` elapses.
pub async fn wait_for_status(
    context: &ExecutionGroupContext<TestWork, String>,
    id: &str,
    status: ExecutionStatus,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if context.status_of(id) == Some(status) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
