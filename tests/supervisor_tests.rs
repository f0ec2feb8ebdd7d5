//! Integration tests for supervised periodic tasks
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use kestrel::error::Result;
use kestrel::metrics::MetricsRegistry;
use kestrel::replication::{PeriodicTask, SupervisedTask, WorkerPool};

struct CountingPayload {
    runs: AtomicUsize,
}

#[async_trait]
impl PeriodicTask for CountingPayload {
    async fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StalledPayload {
    starts: AtomicUsize,
}

#[async_trait]
impl PeriodicTask for StalledPayload {
    async fn run(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_payload_backs_off_and_keeps_rescheduling() {
    let registry = Arc::new(MetricsRegistry::new());
    let pool = Arc::new(WorkerPool::new(8));
    let payload = Arc::new(StalledPayload {
        starts: AtomicUsize::new(0),
    });
    let task = SupervisedTask::new(
        "stalled",
        Arc::clone(&registry),
        pool,
        Duration::from_millis(1000),
        10,
        Arc::clone(&payload) as Arc<dyn PeriodicTask>,
    );

    Arc::clone(&task).schedule(Duration::from_millis(0));

    // first run: starts at t0, times out at t0+1000, next run at +2000
    time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(payload.starts.load(Ordering::SeqCst), 1);
    assert_eq!(task.current_delay(), Duration::from_millis(2000));

    // second run begins 2000ms later and times out again
    time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(payload.starts.load(Ordering::SeqCst), 2);
    assert_eq!(task.current_delay(), Duration::from_millis(4000));

    let metrics = registry.get("stalled").unwrap();
    assert_eq!(metrics.snapshot().timeouts, 2);
    assert_eq!(metrics.snapshot().success, 0);

    task.cancel();
}

#[tokio::test(start_paused = true)]
async fn healthy_payload_runs_at_base_cadence() {
    let registry = Arc::new(MetricsRegistry::new());
    let pool = Arc::new(WorkerPool::new(2));
    let payload = Arc::new(CountingPayload {
        runs: AtomicUsize::new(0),
    });
    let task = SupervisedTask::new(
        "healthy",
        Arc::clone(&registry),
        pool,
        Duration::from_millis(1000),
        10,
        Arc::clone(&payload) as Arc<dyn PeriodicTask>,
    );

    Arc::clone(&task).schedule(Duration::from_millis(500));

    time::sleep(Duration::from_millis(600)).await;
    assert_eq!(payload.runs.load(Ordering::SeqCst), 1);
    assert_eq!(task.current_delay(), Duration::from_millis(1000));

    // every completed invocation schedules exactly one next run
    time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(payload.runs.load(Ordering::SeqCst), 3);

    let metrics = registry.get("healthy").unwrap();
    assert_eq!(metrics.snapshot().success, 3);

    task.cancel();
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_rescheduling() {
    let registry = Arc::new(MetricsRegistry::new());
    let pool = Arc::new(WorkerPool::new(2));
    let payload = Arc::new(CountingPayload {
        runs: AtomicUsize::new(0),
    });
    let task = SupervisedTask::new(
        "cancellable",
        Arc::clone(&registry),
        pool,
        Duration::from_millis(1000),
        10,
        Arc::clone(&payload) as Arc<dyn PeriodicTask>,
    );

    Arc::clone(&task).schedule(Duration::from_millis(100));
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(payload.runs.load(Ordering::SeqCst), 1);

    task.cancel();
    assert!(registry.get("cancellable").is_none());

    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(payload.runs.load(Ordering::SeqCst), 1);
}
