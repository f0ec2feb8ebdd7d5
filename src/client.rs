//! Discovery client composition
//!
//! Wires the replicator and the supervised liveness tasks (lease
//! renewal, registry cache refresh) over one registry client, one
//! bounded worker pool and one metrics registry.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::metrics::MetricsRegistry;
use crate::registry::{InstanceInfo, RegistryClient};
use crate::replication::{InstanceReplicator, PeriodicTask, SupervisedTask, WorkerPool};
use crate::settings::Settings;

pub const HEARTBEAT_TASK: &str = "heartbeat";
pub const REGISTRY_FETCH_TASK: &str = "registry-fetch";

struct HeartbeatTask {
    registry: Arc<dyn RegistryClient>,
}

#[async_trait]
impl PeriodicTask for HeartbeatTask {
    async fn run(&self) -> Result<()> {
        self.registry.renew().await
    }
}

struct RegistryFetchTask {
    registry: Arc<dyn RegistryClient>,
}

#[async_trait]
impl PeriodicTask for RegistryFetchTask {
    async fn run(&self) -> Result<()> {
        self.registry.fetch_registry().await
    }
}

pub struct DiscoveryClient {
    settings: Settings,
    instance: Arc<InstanceInfo>,
    registry: Arc<dyn RegistryClient>,
    metrics: Arc<MetricsRegistry>,
    pool: Arc<WorkerPool>,
    replicator: InstanceReplicator,
    started: AtomicBool,
    shut_down: AtomicBool,
    heartbeat: Mutex<Option<Arc<SupervisedTask>>>,
    registry_fetch: Mutex<Option<Arc<SupervisedTask>>>,
}

impl DiscoveryClient {
    pub fn new(
        settings: Settings,
        instance: Arc<InstanceInfo>,
        registry: Arc<dyn RegistryClient>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let pool = Arc::new(WorkerPool::new(settings.worker_pool_size));
        let replicator = InstanceReplicator::new(
            Arc::clone(&registry),
            Arc::clone(&instance),
            settings.replication_settings(),
        );
        Self {
            settings,
            instance,
            registry,
            metrics,
            pool,
            replicator,
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
            registry_fetch: Mutex::new(None),
        }
    }

    pub fn instance(&self) -> &Arc<InstanceInfo> {
        &self.instance
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Idempotent. Arms the replicator and both supervised tasks.
    pub fn start(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        info!(
            instance = %self.instance.id(),
            app = %self.instance.app(),
            "starting discovery client"
        );
        self.replicator
            .start(self.settings.initial_replication_delay());

        let heartbeat = SupervisedTask::new(
            HEARTBEAT_TASK,
            Arc::clone(&self.metrics),
            Arc::clone(&self.pool),
            self.settings.supervisor_timeout(),
            self.settings.supervisor_backoff_bound,
            Arc::new(HeartbeatTask {
                registry: Arc::clone(&self.registry),
            }),
        );
        Arc::clone(&heartbeat).schedule(self.settings.heartbeat_interval());
        *self.heartbeat.lock() = Some(heartbeat);

        let registry_fetch = SupervisedTask::new(
            REGISTRY_FETCH_TASK,
            Arc::clone(&self.metrics),
            Arc::clone(&self.pool),
            self.settings.supervisor_timeout(),
            self.settings.supervisor_backoff_bound,
            Arc::new(RegistryFetchTask {
                registry: Arc::clone(&self.registry),
            }),
        );
        Arc::clone(&registry_fetch).schedule(self.settings.registry_fetch_interval());
        *self.registry_fetch.lock() = Some(registry_fetch);
    }

    /// Tell the replicator the descriptor changed. Returns `false` when
    /// the update was not admitted.
    pub fn notify_instance_change(&self) -> bool {
        self.instance.mark_dirty();
        self.replicator.on_demand_update()
    }

    /// Idempotent orderly shutdown of all background work.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(instance = %self.instance.id(), "discovery client shutting down");
        if let Some(task) = self.heartbeat.lock().take() {
            task.cancel();
        }
        if let Some(task) = self.registry_fetch.lock().take() {
            task.cancel();
        }
        self.replicator.stop().await;
        self.pool.shutdown();
    }
}
