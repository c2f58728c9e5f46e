//! Background shutdown of worker pools.
//!
//! Closing an engine must not block the caller, so the runtime is handed to a dedicated
//! thread which drains in-flight tasks for a grace period and then forces shutdown. One
//! service can be shared by any number of engines.

use crate::engine::pool::DetachedPool;
use crate::error::EngineError;
use parking_lot::Mutex;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct ShutdownJob {
    name: String,
    pool: DetachedPool,
    grace: Duration,
}

impl ShutdownJob {
    fn run(self) {
        let ShutdownJob { name, pool, grace } = self;
        let DetachedPool { runtime, in_flight } = pool;
        let drained = runtime.block_on(async {
            tokio::time::timeout(grace, in_flight.wait_idle())
                .await
                .is_ok()
        });
        if drained {
            debug!(pool = %name, "Worker pool drained");
        } else {
            warn!(
                pool = %name,
                in_flight = in_flight.count(),
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, forcing worker pool shutdown"
            );
        }
        runtime.shutdown_background();
        info!(pool = %name, "Worker pool shut down");
    }
}

pub struct ShutdownService {
    sender: Mutex<Option<mpsc::UnboundedSender<ShutdownJob>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ShutdownService {
    /// Start the shutdown thread.
    pub fn start() -> Result<Self, EngineError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ShutdownJob>();
        let worker = thread::Builder::new()
            .name("groupexec-shutdown".to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job.run();
                }
                debug!("Shutdown service stopped");
            })
            .map_err(|e| {
                EngineError::PoolError(format!("Failed to start shutdown thread: {}", e))
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub(crate) fn submit(
        &self,
        name: String,
        pool: DetachedPool,
        grace: Duration,
    ) -> Result<(), EngineError> {
        let job = ShutdownJob { name, pool, grace };
        let job = match self.sender.lock().as_ref() {
            Some(sender) => match sender.send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        // Service already stopped; shut this pool down on a thread of its own.
        thread::Builder::new()
            .name("groupexec-shutdown".to_string())
            .spawn(move || job.run())
            .map(|_| ())
            .map_err(|e| EngineError::PoolError(format!("Failed to start shutdown thread: {}", e)))
    }

    /// Finish every queued shutdown and stop the thread. Blocks until done.
    pub fn stop(&self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Shutdown thread panicked");
            }
        }
    }
}

impl Drop for ShutdownService {
    fn drop(&mut self) {
        // Closing the channel lets the thread exit once queued jobs are done; never join here.
        self.sender.get_mut().take();
    }
}
