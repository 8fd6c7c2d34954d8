//! Typed key/value primitives over a [`CacheStore`].

use crate::metrics::CacheMetrics;
use crate::{
    CacheCodec, CacheError, CacheResult, CacheStatistics, CacheStats, CacheStore, JsonCodec,
    KeyTtl, Lookup,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Low-level cache operations with hit/miss/error accounting.
///
/// Every method makes exactly one store call, bounded by the per-call
/// timeout. Failures come back as values and are counted once here, so
/// callers never need to record them again.
pub struct CacheAccessor<C: CacheCodec = JsonCodec> {
    store: Arc<dyn CacheStore>,
    codec: C,
    stats: CacheStats,
    timeout: Duration,
}

impl CacheAccessor<JsonCodec> {
    /// Accessor using the JSON codec.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self::with_codec(store, JsonCodec, timeout)
    }
}

impl<C: CacheCodec> CacheAccessor<C> {
    /// Accessor with a custom codec.
    #[must_use]
    pub fn with_codec(store: Arc<dyn CacheStore>, codec: C, timeout: Duration) -> Self {
        Self {
            store,
            codec,
            stats: CacheStats::new(),
            timeout,
        }
    }

    /// Runs one store call under the timeout and records its outcome.
    async fn call<T, F>(&self, operation: &'static str, key: &str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>> + Send,
    {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(CacheError::Timeout(self.timeout)));
        CacheMetrics::store_duration(operation, started.elapsed());

        if let Err(e) = &result {
            self.record_failure(operation, key, e);
        }
        result
    }

    fn record_failure(&self, operation: &'static str, key: &str, error: &CacheError) {
        self.stats.record_error();
        CacheMetrics::error(operation, error.kind());
        if error.is_unavailable() {
            debug!(operation, key, error = %error, "Cache unavailable");
        } else {
            warn!(operation, key, error = %error, "Cache operation failed");
        }
    }

    /// Reads and decodes `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let raw = match self.call("get", key, self.store.get(key)).await {
            Ok(raw) => raw,
            Err(e) if e.is_unavailable() => return Lookup::Unavailable,
            Err(e) => return Lookup::Failed(e),
        };

        let Some(raw) = raw else {
            self.stats.record_miss();
            CacheMetrics::miss("get");
            debug!(key, "Cache miss");
            return Lookup::Miss;
        };

        match self.codec.decode(&raw) {
            Ok(value) => {
                self.stats.record_hit();
                CacheMetrics::hit("get");
                debug!(key, "Cache hit");
                Lookup::Hit(value)
            }
            Err(e) => {
                self.record_failure("decode", key, &e);
                Lookup::Failed(e)
            }
        }
    }

    /// Encodes `value` and writes it with a TTL of `ttl_secs`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let raw = match self.codec.encode(value) {
            Ok(raw) => raw,
            Err(e) => {
                self.record_failure("encode", key, &e);
                return Err(e);
            }
        };
        self.call("set", key, self.store.set_ex(key, &raw, ttl_secs))
            .await?;
        debug!(key, ttl_secs, "Cached value");
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.call("exists", key, self.store.exists(key)).await
    }

    /// Deletes `key`; true only if it existed.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.call("delete", key, self.store.delete(key)).await
    }

    /// Deletes every key matching `pattern` in one batch.
    ///
    /// No match is `Ok(0)`.
    pub async fn delete_by_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let deleted = self
            .call("delete_pattern", pattern, self.store.delete_matching(pattern))
            .await?;
        debug!(pattern, deleted, "Deleted keys by pattern");
        Ok(deleted)
    }

    pub async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool> {
        self.call("expire", key, self.store.expire(key, ttl_secs)).await
    }

    pub async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.call("ttl", key, self.store.ttl(key)).await
    }

    /// Wipes the whole logical database.
    pub async fn flush_all(&self) -> CacheResult<()> {
        self.call("flush", "*", self.store.flush()).await
    }

    /// Liveness round trip. Not counted in the statistics.
    pub async fn ping(&self) -> CacheResult<()> {
        tokio::time::timeout(self.timeout, self.store.ping())
            .await
            .unwrap_or(Err(CacheError::Timeout(self.timeout)))
    }

    /// Raw counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Counters combined with the store's pool occupancy.
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics::from_parts(&self.stats, self.store.pool_status())
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<C: CacheCodec> std::fmt::Debug for CacheAccessor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAccessor")
            .field("backend", &self.store.backend_name())
            .field("stats", &self.stats)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
