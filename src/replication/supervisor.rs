//! Self-rescheduling supervised periodic tasks
//!
//! A `SupervisedTask` runs its payload on the bounded worker pool under a
//! wall-clock timeout and schedules itself again after every completed
//! invocation. A timed-out run doubles the next delay up to
//! `timeout * backoff_bound`; a successful run resets it. Rejections and
//! payload failures keep the current cadence.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::{MetricsRegistry, TaskMetrics};
use crate::replication::worker_pool::WorkerPool;

/// Payload run by a supervised task. Payloads must tolerate being
/// aborted mid-run after a timeout.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    async fn run(&self) -> Result<()>;
}

pub struct SupervisedTask {
    name: String,
    pool: Arc<WorkerPool>,
    timeout: Duration,
    base_delay_millis: u64,
    max_delay_millis: u64,
    // next scheduling delay; only ever between base and max
    delay_millis: AtomicU64,
    payload: Arc<dyn PeriodicTask>,
    metrics: Arc<TaskMetrics>,
    metrics_registry: Arc<MetricsRegistry>,
    cancelled: AtomicBool,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl SupervisedTask {
    pub fn new(
        name: impl Into<String>,
        metrics_registry: Arc<MetricsRegistry>,
        pool: Arc<WorkerPool>,
        timeout: Duration,
        backoff_bound: u32,
        payload: Arc<dyn PeriodicTask>,
    ) -> Arc<Self> {
        let name = name.into();
        let metrics = metrics_registry.register(&name);
        let base_delay_millis = timeout.as_millis() as u64;
        let max_delay_millis = base_delay_millis * u64::from(backoff_bound.max(1));
        Arc::new(Self {
            name,
            pool,
            timeout,
            base_delay_millis,
            max_delay_millis,
            delay_millis: AtomicU64::new(base_delay_millis),
            payload,
            metrics,
            metrics_registry,
            cancelled: AtomicBool::new(false),
            runner: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delay before the next scheduled run.
    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.delay_millis.load(Ordering::Relaxed))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Arm the task: first run after `initial_delay`, then one run per
    /// completed invocation at the adaptive delay.
    pub fn schedule(self: Arc<Self>, initial_delay: Duration) {
        let task = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            time::sleep(initial_delay).await;
            while !task.is_cancelled() {
                task.supervise_once().await;
                if task.is_cancelled() {
                    break;
                }
                time::sleep(task.current_delay()).await;
            }
            debug!(task = %task.name, "supervised task loop stopped");
        });
        *self.runner.lock() = Some(handle);
    }

    /// Unregister metrics and stop rescheduling. A payload already running
    /// on the pool is detached, not interrupted.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.metrics_registry.unregister(&self.name);
        if let Some(handle) = self.runner.lock().take() {
            handle.abort();
        }
        debug!(task = %self.name, "supervised task cancelled");
    }

    pub(crate) async fn supervise_once(&self) {
        let payload = Arc::clone(&self.payload);
        let handle = match self.pool.try_submit(async move { payload.run().await }) {
            Ok(handle) => handle,
            Err(err) => {
                // shutting down or merely saturated, the message tells which
                warn!(task = %self.name, "{}, run rejected", err);
                self.metrics.rejected_executions.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        self.metrics
            .pool_used
            .store(self.pool.active_count() as u64, Ordering::Relaxed);

        let abort = handle.abort_handle();
        match time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(()))) => {
                self.delay_millis
                    .store(self.base_delay_millis, Ordering::Relaxed);
                self.metrics
                    .pool_used
                    .store(self.pool.active_count() as u64, Ordering::Relaxed);
                self.metrics.success.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(Err(err))) => {
                warn!(task = %self.name, error = %err, "supervised run failed");
                self.metrics.throwables.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(join_err)) => {
                warn!(task = %self.name, error = %join_err, "supervised run panicked");
                self.metrics.throwables.fetch_add(1, Ordering::Relaxed);
            }
            Err(_elapsed) => {
                warn!(
                    task = %self.name,
                    timeout_millis = self.timeout.as_millis() as u64,
                    "supervised run timed out"
                );
                self.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                let current = self.delay_millis.load(Ordering::Relaxed);
                let doubled = current.saturating_mul(2).min(self.max_delay_millis);
                // a lost race means a fresher observation already landed
                let _ = self.delay_millis.compare_exchange(
                    current,
                    doubled,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
        }
        // a timed-out payload still holds its worker slot; cut it loose
        abort.abort();
    }
}
