//! Daemon metrics
//!
//! Coarse counters for the coordinator's operation traffic, surfaced in
//! the daemon status response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Atomic counter for thread-safe incrementing
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Atomic gauge for thread-safe value tracking
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Coordinator operation metrics.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    /// Operations dispatched, all outcomes.
    pub ops_total: Counter,
    /// Operations terminating with a non-success status.
    pub ops_failed: Counter,
    /// Operations rejected with SYSTEM_BUSY at lock acquisition.
    pub busy_rejections: Counter,
    /// Phase messages sent to participants.
    pub phases_sent: Counter,
    /// Requests currently being handled.
    pub active_requests: Gauge,
}

impl CoordinatorMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ops_total: self.ops_total.get(),
            ops_failed: self.ops_failed.get(),
            busy_rejections: self.busy_rejections.get(),
            phases_sent: self.phases_sent.get(),
            active_requests: self.active_requests.get(),
        }
    }
}

/// Point-in-time view of the coordinator metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ops_total: u64,
    pub ops_failed: u64,
    pub busy_rejections: u64,
    pub phases_sent: u64,
    pub active_requests: u64,
}
