//! Cache statistics
//!
//! Counters are atomics so reads and writes on different keys never contend
//! on a lock just to record a metric.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of response cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries, including ones that expired but were not read since
    pub size: usize,

    /// Requests currently in flight in the dedup registry
    pub pending: usize,

    /// Reads served from the cache
    pub hits: u64,

    /// Reads that found nothing or an expired entry
    pub misses: u64,

    /// Entries written
    pub inserts: u64,

    /// Expired entries removed, lazily or by a purge
    pub expirations: u64,

    /// Entries removed by `invalidate`
    pub invalidations: u64,

    /// Callers that attached to an existing in-flight request
    pub dedup_joins: u64,
}

impl CacheStats {
    /// hits / (hits + misses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    dedup_joins: AtomicU64,
}

impl MetricsCollector {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_dedup_join(&self) {
        self.dedup_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize, pending: usize) -> CacheStats {
        CacheStats {
            size,
            pending,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
        }
    }
}
