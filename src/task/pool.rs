//! Bounded worker pool used for each pipeline stage

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::ScanError;

/// Runs at most `size` jobs at once.
///
/// `submit` waits for a free slot, so a saturated pool slows its producer
/// down instead of queueing work. `drain` is a counting barrier over every
/// job submitted so far. A panicking job is logged and counted; it never
/// takes the pool or the task down.
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    stats: Arc<PoolStats>,
}

#[derive(Debug, Default)]
pub struct PoolStats {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub panicked: AtomicU64,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name,
            size,
            slots: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently running
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Wait for a free slot and start `job` on it
    pub async fn submit<F>(&self, job: F) -> crate::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ScanError::TaskStateError(format!("{} pool is closed", self.name)))?;

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::clone(&self.stats);
        let name = self.name;
        self.tracker.spawn(async move {
            let _permit = permit;
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                stats.panicked.fetch_add(1, Ordering::Relaxed);
                log::error!("{} pool: worker panicked", name);
            }
            stats.completed.fetch_add(1, Ordering::Relaxed);
        });
        Ok(())
    }

    /// Wait until every submitted job has finished. The pool stays usable.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Reject further submissions; running jobs are not interrupted
    pub fn close(&self) {
        self.slots.close();
        self.tracker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}
