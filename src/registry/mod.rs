//! Registry client seam and implementations
//!
//! The replicator and the supervised liveness tasks talk to the remote
//! registry through the `RegistryClient` trait so that transports can be
//! swapped (and mocked) without touching the replication machinery.
use async_trait::async_trait;

use crate::error::Result;

pub mod http;
pub mod instance;

pub use http::HttpRegistryClient;
pub use instance::{InstanceInfo, InstanceSnapshot, InstanceStatus, LeaseInfo};

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Re-derive locally computed instance data (lease terms, status)
    /// before a replication pass. May dirty the descriptor.
    async fn refresh_instance_info(&self) -> Result<()>;

    /// Push the current descriptor to the registry.
    async fn register(&self) -> Result<()>;

    /// Renew the instance lease. An unknown lease re-registers.
    async fn renew(&self) -> Result<()>;

    /// Refresh the local cache of the remote registry.
    async fn fetch_registry(&self) -> Result<()>;
}
