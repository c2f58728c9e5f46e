//! Worker pool backing sub-group, group and orchestrator tasks.

use crate::error::EngineError;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Engine-owned multi-threaded runtime.
///
/// `size > 0` fixes the worker thread count and caps concurrently running sub-groups at `size`.
/// `size == 0` uses the runtime's default thread count and runs every sub-group at once.
/// Group and orchestrator tasks only wait on other tasks and are never capped, so a group
/// can not starve its own sub-groups of permits.
pub struct WorkerPool {
    size: usize,
    handle: RwLock<Option<Handle>>,
    runtime: Mutex<Option<Runtime>>,
    permits: Option<Arc<Semaphore>>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    pub fn new(size: usize, thread_name: &str) -> Result<Self, EngineError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if size > 0 {
            builder.worker_threads(size);
        }
        let runtime = builder
            .build()
            .map_err(|e| EngineError::PoolError(format!("Failed to start worker pool: {}", e)))?;

        debug!(size, thread_name, "Worker pool started");
        Ok(Self {
            size,
            handle: RwLock::new(Some(runtime.handle().clone())),
            runtime: Mutex::new(Some(runtime)),
            permits: (size > 0).then(|| Arc::new(Semaphore::new(size))),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.handle.read().is_none()
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Spawn an uncapped task. Fails with `PoolClosed` once the pool was detached.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, EngineError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.handle.read().clone().ok_or(EngineError::PoolClosed)?;
        let guard = InFlightGuard::enter(Arc::clone(&self.in_flight));
        Ok(handle.spawn(async move {
            let _guard = guard;
            future.await
        }))
    }

    /// Spawn a task that holds one of the pool's permits while it runs.
    pub fn spawn_bounded<F>(&self, future: F) -> Result<JoinHandle<F::Output>, EngineError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        self.spawn(async move {
            let _permit = match permits {
                Some(permits) => permits.acquire_owned().await.ok(),
                None => None,
            };
            future.await
        })
    }

    /// Stop accepting tasks and hand out the runtime for shutdown. Returns `None` if the pool
    /// was already detached.
    pub(crate) fn detach(&self) -> Option<DetachedPool> {
        self.handle.write().take();
        self.runtime.lock().take().map(|runtime| DetachedPool {
            runtime,
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

/// A runtime that no longer accepts new tasks, together with its in-flight counter.
pub(crate) struct DetachedPool {
    pub(crate) runtime: Runtime,
    pub(crate) in_flight: Arc<InFlight>,
}

#[derive(Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resolve once no task is in flight.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::AcqRel);
        Self(in_flight)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
