//! Instance replication and supervised periodic work
pub mod replicator;
pub mod supervisor;
pub mod worker_pool;

pub use replicator::InstanceReplicator;
pub use supervisor::{PeriodicTask, SupervisedTask};
pub use worker_pool::{SubmitError, WorkerPool};
