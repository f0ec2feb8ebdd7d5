//! Kestrel: a service-discovery client.
//!
//! Keeps a locally mutable instance descriptor registered with a remote
//! registry (rate-limited, coalesced re-registration), runs liveness
//! work (lease renewal, registry cache refresh) under supervised
//! timeout/backoff, and provides channel building blocks over message
//! transports.
pub mod cli;
pub mod client;
pub mod error;
pub mod limiters;
pub mod metrics;
pub mod registry;
pub mod replication;
pub mod settings;
pub mod transport;
