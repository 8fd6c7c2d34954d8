//! Prometheus-style metrics for cache monitoring.
//!
//! Emitted through the `metrics` facade; without an installed recorder the
//! calls are no-ops.

use crate::{CacheCategory, PoolStatus};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the cache layer.
pub mod names {
    /// Total cache hits.
    pub const CACHE_HITS_TOTAL: &str = "platter_cache_hits_total";
    /// Total cache misses.
    pub const CACHE_MISSES_TOTAL: &str = "platter_cache_misses_total";
    /// Total failed cache operations.
    pub const CACHE_ERRORS_TOTAL: &str = "platter_cache_errors_total";
    /// Total fallback (source of record) invocations.
    pub const CACHE_FALLBACK_TOTAL: &str = "platter_cache_fallback_total";
    /// Total keys removed by invalidation.
    pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "platter_cache_invalidated_keys_total";

    /// Store operation duration in seconds.
    pub const STORE_OPERATION_DURATION: &str = "platter_cache_store_operation_duration_seconds";

    /// Connections open in the Redis pool.
    pub const REDIS_POOL_SIZE: &str = "platter_cache_redis_pool_size";
    /// Idle connections in the Redis pool.
    pub const REDIS_POOL_IDLE: &str = "platter_cache_redis_pool_idle";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(
        names::CACHE_ERRORS_TOTAL,
        "Total number of cache operations that failed or found the store unavailable"
    );
    describe_counter!(
        names::CACHE_FALLBACK_TOTAL,
        "Total number of fallback loads from the source of record"
    );
    describe_counter!(
        names::CACHE_INVALIDATED_KEYS_TOTAL,
        "Total number of keys removed by invalidation"
    );
    describe_histogram!(
        names::STORE_OPERATION_DURATION,
        "Cache store operation duration in seconds"
    );
    describe_gauge!(names::REDIS_POOL_SIZE, "Redis connection pool size");
    describe_gauge!(names::REDIS_POOL_IDLE, "Idle connections in the Redis pool");
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a hit on `operation`.
    pub fn hit(operation: &'static str) {
        counter!(names::CACHE_HITS_TOTAL, "operation" => operation).increment(1);
    }

    /// Record a miss on `operation`.
    pub fn miss(operation: &'static str) {
        counter!(names::CACHE_MISSES_TOTAL, "operation" => operation).increment(1);
    }

    /// Record a failed operation.
    pub fn error(operation: &'static str, kind: &'static str) {
        counter!(
            names::CACHE_ERRORS_TOTAL,
            "operation" => operation,
            "kind" => kind
        )
        .increment(1);
    }

    /// Record a fallback load for `category`.
    pub fn fallback(category: CacheCategory) {
        counter!(names::CACHE_FALLBACK_TOTAL, "category" => category.as_str()).increment(1);
    }

    /// Record keys removed by invalidating `category`.
    pub fn invalidated(category: CacheCategory, keys: u64) {
        counter!(
            names::CACHE_INVALIDATED_KEYS_TOTAL,
            "category" => category.as_str()
        )
        .increment(keys);
    }

    /// Record how long a store operation took.
    pub fn store_duration(operation: &'static str, duration: Duration) {
        histogram!(names::STORE_OPERATION_DURATION, "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Publish pool gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn pool_status(status: PoolStatus) {
        gauge!(names::REDIS_POOL_SIZE).set(status.size as f64);
        gauge!(names::REDIS_POOL_IDLE).set(status.idle as f64);
    }
}
