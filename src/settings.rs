//! Kestrel application settings
use std::time::Duration;

use url::Url;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_REPLICATION_INTERVAL_SECONDS: &str = "30";
pub const DEFAULT_REPLICATION_BURST_SIZE: &str = "2";
pub const DEFAULT_INITIAL_REPLICATION_DELAY_SECONDS: &str = "40";
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: &str = "30";
pub const DEFAULT_REGISTRY_FETCH_INTERVAL_SECONDS: &str = "30";
pub const DEFAULT_SUPERVISOR_TIMEOUT_SECONDS: &str = "30";
pub const DEFAULT_SUPERVISOR_BACKOFF_BOUND: &str = "10";
pub const DEFAULT_WORKER_POOL_SIZE: &str = "2";
pub const DEFAULT_LEASE_RENEWAL_SECONDS: &str = "30";
pub const DEFAULT_LEASE_DURATION_SECONDS: &str = "90";

#[derive(Clone, Copy, Debug)]
pub struct ReplicationSettings {
    pub replication_interval_seconds: u32,
    pub replication_burst_size: u32,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            replication_interval_seconds: 30,
            replication_burst_size: 2,
        }
    }
}

impl ReplicationSettings {
    /// On-demand replications admitted per minute, derived from the sweep
    /// interval and the burst size.
    pub fn allowed_rate_per_minute(&self) -> u32 {
        60 * self.replication_burst_size / self.replication_interval_seconds
    }

    pub fn replication_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.replication_interval_seconds))
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Remote registry base URL
    pub registry_url: Url,

    // Application this instance belongs to
    pub app_name: String,

    // Hostname reported for this instance
    pub hostname: String,

    // Port reported for this instance
    pub port: u16,

    // Lease settings reported to the registry
    pub lease_renewal_seconds: u32,
    pub lease_duration_seconds: u32,

    // Replication settings: sweep interval (seconds) and on-demand burst
    pub replication_interval_seconds: u32,
    pub replication_burst_size: u32,

    // Delay before the first replication sweep
    pub initial_replication_delay_seconds: u32,

    // Supervised task intervals
    pub heartbeat_interval_seconds: u32,
    pub registry_fetch_interval_seconds: u32,

    // Supervisor per-invocation timeout and backoff cap multiplier
    pub supervisor_timeout_seconds: u32,
    pub supervisor_backoff_bound: u32,

    // Bounded worker pool size shared by supervised tasks
    pub worker_pool_size: usize,
}

impl Settings {
    pub fn instance_id(&self) -> String {
        format!("{}:{}:{}", self.hostname, self.app_name, self.port)
    }

    pub fn replication_settings(&self) -> ReplicationSettings {
        ReplicationSettings {
            replication_interval_seconds: self.replication_interval_seconds,
            replication_burst_size: self.replication_burst_size,
        }
    }

    pub fn initial_replication_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.initial_replication_delay_seconds))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.heartbeat_interval_seconds))
    }

    pub fn registry_fetch_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.registry_fetch_interval_seconds))
    }

    pub fn supervisor_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.supervisor_timeout_seconds))
    }
}
