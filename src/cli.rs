//! CLI for this application
//!
use url::Url;

use crate::settings;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, clap::Parser)]
pub struct Cli {
    // Remote registry base URL
    #[clap(
        long,
        env("KESTREL_REGISTRY_URL"),
        help = "Base URL of the discovery registry (e.g., http://registry:8761/v2)"
    )]
    pub registry_url: Url,

    // Application this instance belongs to
    #[clap(
        long,
        env("KESTREL_APP_NAME"),
        help = "Application name this instance registers under"
    )]
    pub app_name: String,

    // Hostname reported for this instance
    #[clap(
        long,
        default_value = "localhost",
        env("KESTREL_HOSTNAME"),
        help = "Hostname to report for this instance"
    )]
    pub hostname: String,

    // Port reported for this instance
    #[clap(
        long,
        default_value = "8080",
        env("KESTREL_PORT"),
        help = "Port to report for this instance"
    )]
    pub port: u16,

    // Lease settings reported to the registry
    #[clap(
        long,
        default_value = settings::DEFAULT_LEASE_RENEWAL_SECONDS,
        env("KESTREL_LEASE_RENEWAL_SECONDS"),
        help = "Lease renewal interval reported to the registry"
    )]
    pub lease_renewal_seconds: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_LEASE_DURATION_SECONDS,
        env("KESTREL_LEASE_DURATION_SECONDS"),
        help = "Lease duration reported to the registry"
    )]
    pub lease_duration_seconds: u32,

    // Replication settings
    #[clap(
        long,
        default_value = settings::DEFAULT_REPLICATION_INTERVAL_SECONDS,
        env("KESTREL_REPLICATION_INTERVAL_SECONDS"),
        help = "Interval in seconds between replication sweeps"
    )]
    pub replication_interval_seconds: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_REPLICATION_BURST_SIZE,
        env("KESTREL_REPLICATION_BURST_SIZE"),
        help = "Burst size for on-demand replication admissions"
    )]
    pub replication_burst_size: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_INITIAL_REPLICATION_DELAY_SECONDS,
        env("KESTREL_INITIAL_REPLICATION_DELAY_SECONDS"),
        help = "Delay in seconds before the first replication sweep"
    )]
    pub initial_replication_delay_seconds: u32,

    // Supervised task intervals
    #[clap(
        long,
        default_value = settings::DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
        env("KESTREL_HEARTBEAT_INTERVAL_SECONDS"),
        help = "Interval in seconds between lease renewals"
    )]
    pub heartbeat_interval_seconds: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_REGISTRY_FETCH_INTERVAL_SECONDS,
        env("KESTREL_REGISTRY_FETCH_INTERVAL_SECONDS"),
        help = "Interval in seconds between registry cache refreshes"
    )]
    pub registry_fetch_interval_seconds: u32,

    // Supervisor timeout and backoff
    #[clap(
        long,
        default_value = settings::DEFAULT_SUPERVISOR_TIMEOUT_SECONDS,
        env("KESTREL_SUPERVISOR_TIMEOUT_SECONDS"),
        help = "Per-invocation timeout in seconds for supervised tasks"
    )]
    pub supervisor_timeout_seconds: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_SUPERVISOR_BACKOFF_BOUND,
        env("KESTREL_SUPERVISOR_BACKOFF_BOUND"),
        help = "Cap multiplier for supervised task backoff"
    )]
    pub supervisor_backoff_bound: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_WORKER_POOL_SIZE,
        env("KESTREL_WORKER_POOL_SIZE"),
        help = "Bounded worker pool size for supervised tasks"
    )]
    pub worker_pool_size: usize,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            registry_url: self.registry_url,
            app_name: self.app_name,
            hostname: self.hostname,
            port: self.port,
            lease_renewal_seconds: self.lease_renewal_seconds,
            lease_duration_seconds: self.lease_duration_seconds,
            replication_interval_seconds: self.replication_interval_seconds,
            replication_burst_size: self.replication_burst_size,
            initial_replication_delay_seconds: self.initial_replication_delay_seconds,
            heartbeat_interval_seconds: self.heartbeat_interval_seconds,
            registry_fetch_interval_seconds: self.registry_fetch_interval_seconds,
            supervisor_timeout_seconds: self.supervisor_timeout_seconds,
            supervisor_backoff_bound: self.supervisor_backoff_bound,
            worker_pool_size: self.worker_pool_size,
        }
    }
}
