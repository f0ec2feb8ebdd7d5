//! Integration tests for the discovery client composition
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use kestrel::client::{DiscoveryClient, HEARTBEAT_TASK, REGISTRY_FETCH_TASK};
use kestrel::error::Result;
use kestrel::registry::{InstanceInfo, RegistryClient};
use kestrel::settings::Settings;

#[derive(Default)]
struct CountingRegistry {
    refresh_calls: AtomicUsize,
    register_calls: AtomicUsize,
    renew_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

#[async_trait]
impl RegistryClient for CountingRegistry {
    async fn refresh_instance_info(&self) -> Result<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn register(&self) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn renew(&self) -> Result<()> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_registry(&self) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_settings() -> Settings {
    Settings {
        registry_url: "http://registry:8761/v2".parse().unwrap(),
        app_name: "payments".to_string(),
        hostname: "host-a".to_string(),
        port: 8080,
        lease_renewal_seconds: 30,
        lease_duration_seconds: 90,
        replication_interval_seconds: 30,
        replication_burst_size: 2,
        initial_replication_delay_seconds: 5,
        heartbeat_interval_seconds: 10,
        registry_fetch_interval_seconds: 10,
        supervisor_timeout_seconds: 10,
        supervisor_backoff_bound: 10,
        worker_pool_size: 2,
    }
}

fn new_client() -> (DiscoveryClient, Arc<CountingRegistry>, Arc<InstanceInfo>) {
    let settings = test_settings();
    let instance = Arc::new(InstanceInfo::new(
        settings.instance_id(),
        settings.app_name.clone(),
        settings.hostname.clone(),
        settings.port,
    ));
    let registry = Arc::new(CountingRegistry::default());
    let client = DiscoveryClient::new(
        settings,
        Arc::clone(&instance),
        Arc::clone(&registry) as Arc<dyn RegistryClient>,
    );
    (client, registry, instance)
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn start_arms_replication_and_liveness_tasks() {
    let (client, registry, _instance) = new_client();
    client.start();
    settle().await;

    assert!(client.metrics().get(HEARTBEAT_TASK).is_some());
    assert!(client.metrics().get(REGISTRY_FETCH_TASK).is_some());

    // initial registration fires after the configured delay
    time::advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(registry.register_calls.load(Ordering::SeqCst), 1);

    // liveness tasks run at their intervals on the worker pool
    time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert!(registry.renew_calls.load(Ordering::SeqCst) >= 1);
    assert!(registry.fetch_calls.load(Ordering::SeqCst) >= 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let (client, registry, _instance) = new_client();
    client.start();
    client.start();
    settle().await;

    time::advance(Duration::from_secs(6)).await;
    settle().await;
    // one replicator, one initial registration
    assert_eq!(registry.register_calls.load(Ordering::SeqCst), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn notify_instance_change_pushes_promptly() {
    let (client, registry, instance) = new_client();
    client.start();
    settle().await;

    // an edit well before the initial sweep is pushed on demand
    time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert!(client.notify_instance_change());
    settle().await;
    assert_eq!(registry.register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(instance.dirty_at(), None);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_background_work() {
    let (client, registry, _instance) = new_client();
    client.start();
    settle().await;

    time::advance(Duration::from_secs(6)).await;
    settle().await;
    let registers = registry.register_calls.load(Ordering::SeqCst);
    assert_eq!(registers, 1);

    client.shutdown().await;
    assert!(client.metrics().get(HEARTBEAT_TASK).is_none());
    assert!(client.metrics().get(REGISTRY_FETCH_TASK).is_none());
    assert!(!client.notify_instance_change());

    time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(registry.register_calls.load(Ordering::SeqCst), registers);
    let renews = registry.renew_calls.load(Ordering::SeqCst);

    time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(registry.renew_calls.load(Ordering::SeqCst), renews);

    // shutdown is idempotent
    client.shutdown().await;
}
