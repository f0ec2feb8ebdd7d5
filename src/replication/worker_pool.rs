//! Bounded worker pool for supervised payloads
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

/// Why a submission was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// All worker slots are busy
    Saturated,
    /// The pool no longer accepts work
    ShuttingDown,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Saturated => write!(f, "worker pool saturated"),
            SubmitError::ShuttingDown => write!(f, "worker pool shutting down"),
        }
    }
}

/// Fixed-size pool of worker slots. Work is spawned onto the runtime but
/// holds a slot permit for its whole run, so at most `size` submissions
/// are in flight and the rest are refused rather than queued.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    shutting_down: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Spawn `work` if a slot is free, refusing otherwise.
    pub fn try_submit<F>(&self, work: F) -> Result<JoinHandle<F::Output>, SubmitError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|err| match err {
                TryAcquireError::Closed => SubmitError::ShuttingDown,
                TryAcquireError::NoPermits => SubmitError::Saturated,
            })?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            work.await
        }))
    }

    /// Worker slots currently occupied.
    pub fn active_count(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop accepting submissions. Running work keeps its slot until done.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.permits.close();
    }
}
