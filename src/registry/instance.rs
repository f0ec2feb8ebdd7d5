//! Local service-instance descriptor
//!
//! The descriptor is mutable from anywhere in the process (status flips,
//! lease changes) while the replicator pushes it to the registry in the
//! background. Local edits are tracked with a millisecond "dirty-at"
//! stamp; replication clears the stamp only if no newer edit raced it.
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Reported status of a service instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Up,
    Down,
    Starting,
    OutOfService,
    Unknown,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Up => write!(f, "up"),
            InstanceStatus::Down => write!(f, "down"),
            InstanceStatus::Starting => write!(f, "starting"),
            InstanceStatus::OutOfService => write!(f, "out-of-service"),
            InstanceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(InstanceStatus::Up),
            "down" => Ok(InstanceStatus::Down),
            "starting" => Ok(InstanceStatus::Starting),
            "out-of-service" => Ok(InstanceStatus::OutOfService),
            "unknown" => Ok(InstanceStatus::Unknown),
            _ => Err(format!("Invalid instance status: {}", s)),
        }
    }
}

/// Lease terms reported to the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub renewal_interval_seconds: u32,
    pub duration_seconds: u32,
}

impl Default for LeaseInfo {
    fn default() -> Self {
        Self {
            renewal_interval_seconds: 30,
            duration_seconds: 90,
        }
    }
}

/// Wire-shaped copy of the descriptor at a point in time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: String,
    pub app: String,
    pub hostname: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub lease: LeaseInfo,
}

/// Mutable descriptor of the local service instance
#[derive(Debug)]
pub struct InstanceInfo {
    id: String,
    app: String,
    hostname: String,
    port: u16,
    status: RwLock<InstanceStatus>,
    lease: RwLock<LeaseInfo>,
    // epoch millis of the latest unreplicated edit, 0 when clean
    dirty_at_millis: AtomicI64,
}

impl InstanceInfo {
    pub fn new(id: String, app: String, hostname: String, port: u16) -> Self {
        Self {
            id,
            app,
            hostname,
            port,
            status: RwLock::new(InstanceStatus::Starting),
            lease: RwLock::new(LeaseInfo::default()),
            dirty_at_millis: AtomicI64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn status(&self) -> InstanceStatus {
        *self.status.read()
    }

    pub fn lease(&self) -> LeaseInfo {
        *self.lease.read()
    }

    /// Record a local edit. The stamp is monotonically nondecreasing even
    /// under concurrent marks.
    pub fn mark_dirty(&self) {
        let now = Utc::now().timestamp_millis();
        self.dirty_at_millis.fetch_max(now, Ordering::AcqRel);
    }

    /// Timestamp of the latest unreplicated edit, if any.
    pub fn dirty_at(&self) -> Option<i64> {
        let stamp = self.dirty_at_millis.load(Ordering::Acquire);
        (stamp != 0).then_some(stamp)
    }

    /// Clear the dirty marker only if it still carries `timestamp`.
    /// An edit that raced the replication keeps its newer stamp.
    pub fn clear_dirty(&self, timestamp: i64) -> bool {
        self.dirty_at_millis
            .compare_exchange(timestamp, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Update the reported status, dirtying the descriptor on change.
    pub fn set_status(&self, status: InstanceStatus) {
        let changed = {
            let mut current = self.status.write();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            self.mark_dirty();
        }
    }

    /// Update the lease terms, dirtying the descriptor on change.
    pub fn set_lease(&self, lease: LeaseInfo) {
        let changed = {
            let mut current = self.lease.write();
            let changed = *current != lease;
            *current = lease;
            changed
        };
        if changed {
            self.mark_dirty();
        }
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id.clone(),
            app: self.app.clone(),
            hostname: self.hostname.clone(),
            port: self.port,
            status: self.status(),
            lease: self.lease(),
        }
    }
}
