//! Counters for supervised background tasks
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Per-task counters and gauges
#[derive(Debug, Default)]
pub struct TaskMetrics {
    pub success: AtomicU64,
    pub timeouts: AtomicU64,
    pub rejected_executions: AtomicU64,
    pub throwables: AtomicU64,
    pub pool_used: AtomicU64,
}

impl TaskMetrics {
    pub fn snapshot(&self) -> FrozenTaskMetrics {
        FrozenTaskMetrics {
            success: self.success.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected_executions: self.rejected_executions.load(Ordering::Relaxed),
            throwables: self.throwables.load(Ordering::Relaxed),
            pool_used: self.pool_used.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy for reporting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrozenTaskMetrics {
    pub success: u64,
    pub timeouts: u64,
    pub rejected_executions: u64,
    pub throwables: u64,
    pub pool_used: u64,
}

/// Registry of task metrics keyed by task name
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    tasks: DashMap<String, Arc<TaskMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-attach to) the metrics for a task name.
    pub fn register(&self, name: &str) -> Arc<TaskMetrics> {
        self.tasks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TaskMetrics::default()))
            .clone()
    }

    pub fn unregister(&self, name: &str) {
        self.tasks.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<TaskMetrics>> {
        self.tasks.get(name).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = MetricsRegistry::new();
        let first = registry.register("heartbeat");
        first.success.fetch_add(3, Ordering::Relaxed);

        let second = registry.register("heartbeat");
        assert_eq!(second.snapshot().success, 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = MetricsRegistry::new();
        registry.register("registry-fetch");
        assert!(registry.get("registry-fetch").is_some());

        registry.unregister("registry-fetch");
        assert!(registry.get("registry-fetch").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_copies_counters() {
        let metrics = TaskMetrics::default();
        metrics.timeouts.fetch_add(2, Ordering::Relaxed);
        metrics.pool_used.store(1, Ordering::Relaxed);

        let frozen = metrics.snapshot();
        assert_eq!(frozen.timeouts, 2);
        assert_eq!(frozen.pool_used, 1);
        assert_eq!(frozen.success, 0);
    }
}
