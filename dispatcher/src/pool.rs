//! Fixed-size worker pool for recording jobs.
//!
//! Wraps a dedicated `rayon` thread pool.  Jobs are spawned FIFO onto
//! exactly `size` named threads; everything beyond that waits in rayon's
//! injector queue.  The queue is unbounded unless a capacity is given, in
//! which case admission fails once `size + capacity` jobs are pending.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one thread")]
    NoWorkers,

    #[error("cannot build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),

    #[error("job queue full ({pending} pending, capacity {capacity})")]
    QueueFull { pending: usize, capacity: usize },
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
    capacity: Option<usize>,
    /// Queued plus running jobs.
    pending: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(size: usize, capacity: Option<usize>) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("recorder-{i}"))
            .panic_handler(|_| error!("Recording job panicked"))
            .build()?;
        Ok(Self {
            pool,
            size,
            capacity,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs accepted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Queue `job`.  Never blocks; fails only when a capacity is configured
    /// and reached.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.admit()?;
        let slot = PendingSlot(self.pending.clone());
        self.pool.spawn_fifo(move || {
            let _slot = slot;
            job();
        });
        Ok(())
    }

    fn admit(&self) -> Result<(), PoolError> {
        let Some(capacity) = self.capacity else {
            self.pending.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        };
        let limit = self.size + capacity;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|pending| PoolError::QueueFull { pending, capacity })
    }
}

/// Releases one pending slot when the job finishes, even by panicking.
struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ─── tests ───────────────────────────────────────────────────────────────
