//! Instance replicator
//!
//! Keeps the local instance descriptor synchronized with the remote
//! registry. A single worker task owns all replication passes, so
//! re-registrations reach the registry strictly in order. Sweeps fire on
//! a timer; callers can push an edit sooner with `on_demand_update`,
//! which cancels the pending sweep (it would fire moments later with no
//! new information) and reschedules after the on-demand pass.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::limiters::RateLimiter;
use crate::registry::{InstanceInfo, RegistryClient};
use crate::settings::ReplicationSettings;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
const COMMAND_QUEUE_DEPTH: usize = 8;

#[derive(Debug)]
enum Command {
    Sweep,
    OnDemand,
    Shutdown,
}

pub struct InstanceReplicator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn RegistryClient>,
    instance: Arc<InstanceInfo>,
    interval: Duration,
    burst_size: u32,
    allowed_rate_per_minute: u32,
    limiter: RateLimiter,
    started: AtomicBool,
    shutting_down: AtomicBool,
    commands: mpsc::Sender<Command>,
    inbox: Mutex<Option<mpsc::Receiver<Command>>>,
    // the currently scheduled sweep timer, at most one at any moment
    periodic_slot: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InstanceReplicator {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        instance: Arc<InstanceInfo>,
        settings: ReplicationSettings,
    ) -> Self {
        let (commands, inbox) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let allowed_rate_per_minute = settings.allowed_rate_per_minute();
        info!(
            allowed_rate_per_minute,
            "on-demand replication admission rate"
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                instance,
                interval: settings.replication_interval(),
                burst_size: settings.replication_burst_size,
                allowed_rate_per_minute,
                limiter: RateLimiter::per_minute(),
                started: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                commands,
                inbox: Mutex::new(Some(inbox)),
                periodic_slot: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Idempotent. Dirties the descriptor so the first sweep performs the
    /// initial registration, then schedules that sweep after
    /// `initial_delay`.
    pub fn start(&self, initial_delay: Duration) {
        let inner = &self.inner;
        if inner.shutting_down.load(Ordering::Acquire) {
            return;
        }
        if inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        inner.instance.mark_dirty(); // for the initial registration
        let Some(inbox) = inner.inbox.lock().take() else {
            return;
        };
        let worker = tokio::spawn(Inner::worker_loop(Arc::clone(inner), inbox));
        *inner.worker.lock() = Some(worker);
        inner.schedule_sweep(initial_delay);
    }

    /// Push local edits ahead of the next sweep. Returns `false` when the
    /// rate limiter denies admission or the replicator is stopped.
    pub fn on_demand_update(&self) -> bool {
        let inner = &self.inner;
        if !inner
            .limiter
            .acquire(inner.burst_size, inner.allowed_rate_per_minute)
        {
            warn!("ignoring on-demand replication, rate limiter denied admission");
            return false;
        }
        if inner.shutting_down.load(Ordering::Acquire) {
            warn!("ignoring on-demand replication, replicator is stopped");
            return false;
        }
        match inner.commands.try_send(Command::OnDemand) {
            Ok(()) => true,
            Err(_) => {
                warn!("ignoring on-demand replication, worker not accepting commands");
                false
            }
        }
    }

    /// Orderly shutdown: the pending sweep timer is cancelled, a pass in
    /// flight completes, and the worker gets a bounded grace period
    /// before it is aborted. Idempotent and safe without a prior `start`.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if inner.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pending) = inner.periodic_slot.lock().take() {
            pending.abort();
        }
        let _ = inner.commands.try_send(Command::Shutdown);
        let worker = inner.worker.lock().take();
        if let Some(handle) = worker {
            let abort = handle.abort_handle();
            if time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("replicator worker did not stop within the grace period, aborting");
                abort.abort();
            }
        }
        inner.started.store(false, Ordering::Release);
    }
}

impl Inner {
    async fn worker_loop(self: Arc<Self>, mut inbox: mpsc::Receiver<Command>) {
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Sweep => {}
                Command::OnDemand => {
                    debug!("executing on-demand replication");
                    let pending = self.periodic_slot.lock().take();
                    if let Some(handle) = pending {
                        if !handle.is_finished() {
                            debug!("cancelling the scheduled sweep, it will be rescheduled after the on-demand pass");
                            handle.abort();
                        }
                    }
                }
                Command::Shutdown => break,
            }
            self.replicate().await;
            self.schedule_sweep(self.interval);
        }
        debug!("replicator worker stopped");
    }

    async fn replicate(&self) {
        if let Err(err) = self.try_replicate().await {
            warn!(error = %err, "instance replication failed, next sweep retries");
        }
    }

    async fn try_replicate(&self) -> Result<()> {
        self.registry.refresh_instance_info().await?;
        if let Some(dirty_at) = self.instance.dirty_at() {
            self.registry.register().await?;
            self.instance.clear_dirty(dirty_at);
        }
        Ok(())
    }

    fn schedule_sweep(&self, delay: Duration) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let commands = self.commands.clone();
        let timer = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = commands.send(Command::Sweep).await;
        });
        // the replaced handle already fired or was cancelled
        *self.periodic_slot.lock() = Some(timer);
    }
}
