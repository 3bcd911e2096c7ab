//! Counters for controller decisions.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters, shared by every in-flight interception.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
    pub(crate) network_responses: AtomicU64,
    pub(crate) network_failures: AtomicU64,
    pub(crate) stale_responses: AtomicU64,
    pub(crate) offline_fallbacks: AtomicU64,
    /// Responses served but not persisted because the store refused the write.
    pub(crate) cache_write_failures: AtomicU64,
    /// Manifest assets that could not be cached during install.
    pub(crate) install_failures: AtomicU64,
}

impl ControllerMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_responses: self.network_responses.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            offline_fallbacks: self.offline_fallbacks.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            install_failures: self.install_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ControllerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub network_responses: u64,
    pub network_failures: u64,
    pub stale_responses: u64,
    pub offline_fallbacks: u64,
    pub cache_write_failures: u64,
    pub install_failures: u64,
}
