//! Hit/miss/error accounting.

use crate::PoolStatus;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by every cache call.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current `(hits, misses, errors)`.
    #[must_use]
    pub fn counts(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }

    /// Zeroes all counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time statistics report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    /// `100 * hits / (hits + misses)`, 0 before the first read.
    pub hit_rate_percent: f64,
    /// Connections currently checked out.
    pub pool_active: usize,
    /// Connections idle in the pool.
    pub pool_idle: usize,
}

impl CacheStatistics {
    /// Builds a report from counters and the pool's current state.
    #[must_use]
    pub fn from_parts(stats: &CacheStats, pool: PoolStatus) -> Self {
        let (hits, misses, errors) = stats.counts();
        Self {
            hits,
            misses,
            errors,
            hit_rate_percent: hit_rate_percent(hits, misses),
            pool_active: pool.active,
            pool_idle: pool.idle,
        }
    }
}

/// Hit rate in percent; 0 when nothing has been read yet.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        100.0 * hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(hit_rate_percent(0, 0), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        assert_eq!(hit_rate_percent(3, 1), 75.0);
        assert_eq!(hit_rate_percent(0, 4), 0.0);
        assert_eq!(hit_rate_percent(5, 0), 100.0);
    }

    #[test]
    fn test_counters_and_reset() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_error();
        assert_eq!(stats.counts(), (2, 1, 1));

        stats.reset();
        assert_eq!(stats.counts(), (0, 0, 0));
    }

    #[test]
    fn test_statistics_from_parts() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();

        let pool = PoolStatus {
            max_size: 20,
            size: 5,
            active: 2,
            idle: 3,
        };
        let report = CacheStatistics::from_parts(&stats, pool);
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(report.hit_rate_percent, 50.0);
        assert_eq!(report.pool_active, 2);
        assert_eq!(report.pool_idle, 3);
    }
}
