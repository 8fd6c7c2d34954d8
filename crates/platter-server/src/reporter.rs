//! Periodic cache statistics reporting.

use platter_cache::{CacheMetrics, CacheService, CacheStatistics};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Logs one statistics line and refreshes the pool gauges.
pub async fn report(cache: &CacheService) -> CacheStatistics {
    let stats = cache.statistics();
    CacheMetrics::pool_status(cache.accessor().store().pool_status());

    if cache.is_healthy().await {
        info!(
            hits = stats.hits,
            misses = stats.misses,
            errors = stats.errors,
            hit_rate_percent = stats.hit_rate_percent,
            pool_active = stats.pool_active,
            pool_idle = stats.pool_idle,
            "Cache statistics"
        );
    } else {
        warn!(
            hits = stats.hits,
            misses = stats.misses,
            errors = stats.errors,
            "Cache unhealthy, reads are served by the source of record"
        );
    }
    stats
}

/// Renders statistics as a JSON object for the shutdown summary.
#[must_use]
pub fn summary(stats: &CacheStatistics) -> String {
    serde_json::to_string(stats).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

/// Spawns a task calling [`report`] every `interval` until aborted.
pub fn spawn_stats_reporter(cache: Arc<CacheService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if cache.is_shut_down() {
                break;
            }
            report(&cache).await;
        }
    })
}
