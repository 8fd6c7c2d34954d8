//! Domain-facing cache-aside facade.
//!
//! [`CacheService`] maps entity categories to namespaced keys and TTL tiers,
//! reads through to a caller-supplied fallback on a miss and owns the
//! invalidation policy. One instance is built at process start, shared as an
//! `Arc` and shut down exactly once.

use crate::metrics::CacheMetrics;
use crate::{
    normalize_search_query, CacheAccessor, CacheCategory, CacheCodec, CacheError, CacheKeys,
    CacheStatistics, CacheStore, ConnectionPoolManager, JsonCodec, Lookup, MemoryStore, RedisStore,
};
use async_trait::async_trait;
use platter_config::{RedisConfig, StoreBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Populates the cache ahead of traffic.
#[async_trait]
pub trait CacheWarmer<C: CacheCodec = JsonCodec>: Send + Sync {
    /// Loads entries into `cache`; returns how many were written.
    async fn warm(&self, cache: &CacheService<C>) -> usize;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// What an [`invalidate`](CacheService::invalidate) call removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Whether the entity's own key existed.
    pub removed: bool,
    /// Dependent list keys deleted alongside.
    pub lists_removed: u64,
}

/// Generates one read-through loader per entity category.
macro_rules! category_loaders {
    ($($(#[$doc:meta])* $name:ident => $category:expr;)*) => {
        $(
            $(#[$doc])*
            pub async fn $name<T, F, Fut>(
                &self,
                id: impl fmt::Display + Send,
                fallback: F,
            ) -> Option<T>
            where
                T: Serialize + DeserializeOwned + Send + Sync,
                F: FnOnce() -> Fut + Send,
                Fut: Future<Output = Option<T>> + Send,
            {
                self.get_or_load($category, id, fallback).await
            }
        )*
    };
}

/// Cache-aside service over a [`CacheAccessor`].
pub struct CacheService<C: CacheCodec = JsonCodec> {
    accessor: CacheAccessor<C>,
    keys: CacheKeys,
    warmers: Vec<Arc<dyn CacheWarmer<C>>>,
    shut_down: AtomicBool,
}

impl CacheService<JsonCodec> {
    /// Builds the service for the configured backend.
    ///
    /// Never fails: an unreachable Redis leaves the service in degraded
    /// mode where every read goes straight to the fallback.
    pub async fn from_config(config: &RedisConfig) -> Self {
        let store: Arc<dyn CacheStore> = match config.backend {
            StoreBackend::Memory if config.enabled => {
                info!("Using in-process memory cache store");
                let store = Arc::new(MemoryStore::new());
                store.spawn_purge_task(config.eviction_interval());
                store
            }
            StoreBackend::Memory | StoreBackend::Redis => {
                let pool = ConnectionPoolManager::connect(config).await;
                Arc::new(RedisStore::new(Arc::new(pool)))
            }
        };

        let keys = config
            .key_prefix
            .as_deref()
            .map_or_else(CacheKeys::new, CacheKeys::with_prefix);

        Self::new(CacheAccessor::new(store, config.timeout()), keys)
    }
}

impl<C: CacheCodec> CacheService<C> {
    /// Wraps an accessor with a key builder.
    #[must_use]
    pub fn new(accessor: CacheAccessor<C>, keys: CacheKeys) -> Self {
        Self {
            accessor,
            keys,
            warmers: Vec::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Registers a warmer run by [`warm_up`](Self::warm_up).
    #[must_use]
    pub fn with_warmer(mut self, warmer: Arc<dyn CacheWarmer<C>>) -> Self {
        self.warmers.push(warmer);
        self
    }

    /// Reads `(category, id)`, loading it from `fallback` on a miss.
    ///
    /// Cache failures are absorbed and behave like a miss. An error from the
    /// fallback is returned unchanged and nothing is cached.
    pub async fn try_get_or_load<T, E, F, Fut>(
        &self,
        category: CacheCategory,
        id: impl fmt::Display + Send,
        fallback: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
    {
        let key = self.keys.entity(category, id);
        self.read_through(category, &key, fallback).await
    }

    /// Infallible form of [`try_get_or_load`](Self::try_get_or_load).
    pub async fn get_or_load<T, F, Fut>(
        &self,
        category: CacheCategory,
        id: impl fmt::Display + Send,
        fallback: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Option<T>> + Send,
    {
        let loaded = self
            .try_get_or_load(category, id, move || async move {
                Ok::<_, Infallible>(fallback().await)
            })
            .await;
        match loaded {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    async fn read_through<T, E, F, Fut>(
        &self,
        category: CacheCategory,
        key: &str,
        fallback: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
    {
        let lookup = self.accessor.get::<T>(key).await;
        let store_reachable = match lookup {
            Lookup::Hit(value) => return Ok(Some(value)),
            // a hung store would stall the write-back for another timeout
            Lookup::Unavailable | Lookup::Failed(CacheError::Timeout(_)) => false,
            Lookup::Miss | Lookup::Failed(_) => true,
        };

        CacheMetrics::fallback(category);
        debug!(key, category = %category, "Loading from source of record");
        let loaded = fallback().await?;

        if let Some(value) = &loaded {
            if store_reachable {
                // failures are counted by the accessor
                let _ = self.accessor.set(key, value, category.ttl_seconds()).await;
            }
        }
        Ok(loaded)
    }

    category_loaders! {
        /// User by id (30 minutes).
        user => CacheCategory::User;
        /// Restaurant by id (1 hour).
        restaurant => CacheCategory::Restaurant;
        /// Menu items of one restaurant, keyed by restaurant id (30 minutes).
        menu_items => CacheCategory::Menu;
        /// Menu item by id (30 minutes).
        item => CacheCategory::Item;
        /// Order by id (5 minutes).
        order => CacheCategory::Order;
        /// Named analytics report (1 hour).
        analytics => CacheCategory::Analytics;
        /// Session by token (5 minutes).
        session => CacheCategory::Session;
        /// Named aggregate statistic (24 hours).
        stats => CacheCategory::Stats;
    }

    /// Restaurant listing for an opaque query key (1 hour).
    pub async fn restaurant_list<T, F, Fut>(
        &self,
        query_key: impl fmt::Display + Send,
        fallback: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Option<T>> + Send,
    {
        self.get_or_load_list(CacheCategory::RestaurantList, query_key, fallback)
            .await
    }

    /// Orders placed by one user (5 minutes).
    pub async fn user_orders<T, F, Fut>(
        &self,
        user_id: impl fmt::Display + Send,
        fallback: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Option<T>> + Send,
    {
        let query_key = format!("user:{}", user_id);
        self.get_or_load_list(CacheCategory::OrderList, query_key, fallback)
            .await
    }

    /// Search results; equivalent queries share one entry (30 minutes).
    pub async fn search<T, F, Fut>(&self, query: &str, fallback: F) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Option<T>> + Send,
    {
        let normalized = normalize_search_query(query);
        self.get_or_load(CacheCategory::Search, normalized, fallback)
            .await
    }

    /// Writes an entity with its category's TTL. False if the write failed.
    pub async fn put<T>(&self, category: CacheCategory, id: impl fmt::Display, value: &T) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        let key = self.keys.entity(category, id);
        self.accessor
            .set(&key, value, category.ttl_seconds())
            .await
            .is_ok()
    }

    /// Writes a collection result under `<namespace>:list:<query_key>`.
    pub async fn cache_list<T>(
        &self,
        category: CacheCategory,
        query_key: impl fmt::Display,
        value: &T,
    ) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        let key = self.keys.list(category, query_key);
        self.accessor
            .set(&key, value, category.ttl_seconds())
            .await
            .is_ok()
    }

    /// Reads a cached collection result.
    pub async fn get_list<T>(
        &self,
        category: CacheCategory,
        query_key: impl fmt::Display,
    ) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let key = self.keys.list(category, query_key);
        self.accessor.get(&key).await.into_option()
    }

    /// Read-through for a collection result.
    pub async fn get_or_load_list<T, F, Fut>(
        &self,
        category: CacheCategory,
        query_key: impl fmt::Display + Send,
        fallback: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Option<T>> + Send,
    {
        let key = self.keys.list(category, query_key);
        let loaded = self
            .read_through(category, &key, move || async move {
                Ok::<_, Infallible>(fallback().await)
            })
            .await;
        match loaded {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Drops an entity and, for restaurants and analytics, every list key
    /// in its namespace.
    ///
    /// Idempotent; a second call simply finds nothing to remove.
    pub async fn invalidate(&self, category: CacheCategory, id: impl fmt::Display) -> Invalidation {
        let key = self.keys.entity(category, id);
        let removed = self.accessor.delete(&key).await.unwrap_or(false);
        if removed {
            CacheMetrics::invalidated(category, 1);
        }

        let lists_removed = if category.has_list_dependents() {
            self.invalidate_lists(category).await
        } else {
            0
        };

        debug!(key = %key, removed, lists_removed, "Invalidated cache entry");
        Invalidation {
            removed,
            lists_removed,
        }
    }

    /// Drops every list key in `category`'s namespace; returns the count.
    pub async fn invalidate_lists(&self, category: CacheCategory) -> u64 {
        let pattern = self.keys.list_pattern(category);
        let deleted = self.accessor.delete_by_pattern(&pattern).await.unwrap_or(0);
        if deleted > 0 {
            CacheMetrics::invalidated(category, deleted);
        }
        deleted
    }

    /// Runs the registered warmers; returns the number of entries written.
    pub async fn warm_up(&self) -> usize {
        if self.warmers.is_empty() {
            debug!("No cache warmers registered");
            return 0;
        }

        let mut total = 0;
        for warmer in &self.warmers {
            let written = warmer.warm(self).await;
            info!(warmer = warmer.name(), entries = written, "Cache warmer finished");
            total += written;
        }
        total
    }

    /// Removes every cached entry of this deployment.
    ///
    /// With a key prefix only the prefixed keys go; without one the whole
    /// logical database is flushed.
    pub async fn clear_all(&self) -> bool {
        match self.keys.deployment_pattern() {
            Some(pattern) => {
                warn!(pattern = %pattern, "Clearing all cache entries");
                self.accessor.delete_by_pattern(&pattern).await.is_ok()
            }
            None => {
                warn!("Flushing entire cache database");
                self.accessor.flush_all().await.is_ok()
            }
        }
    }

    /// Hit/miss/error counters plus pool occupancy.
    pub fn statistics(&self) -> CacheStatistics {
        self.accessor.statistics()
    }

    /// Zeroes the hit/miss/error counters.
    pub fn reset_statistics(&self) {
        self.accessor.stats().reset();
        info!("Cache statistics reset");
    }

    /// True while the store answers a ping within the per-call timeout.
    pub async fn is_healthy(&self) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.accessor.ping().await.is_ok()
    }

    /// Releases the store. Only the first call does anything; returns
    /// whether this call performed the shutdown.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Cache service already shut down");
            return false;
        }

        info!(
            backend = self.accessor.store().backend_name(),
            "Shutting down cache service..."
        );
        self.accessor.store().close().await;
        info!("Cache service shut down");
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn accessor(&self) -> &CacheAccessor<C> {
        &self.accessor
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }
}

impl<C: CacheCodec> fmt::Debug for CacheService<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("accessor", &self.accessor)
            .field("keys", &self.keys)
            .field("warmers", &self.warmers.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockCacheStore;
    use crate::PoolStatus;
    use std::time::Duration;

    fn memory_service() -> CacheService {
        let accessor = CacheAccessor::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        CacheService::new(accessor, CacheKeys::new())
    }

    #[tokio::test]
    async fn test_fallback_error_is_returned_and_not_cached() {
        let cache = memory_service();

        let result: Result<Option<String>, &str> = cache
            .try_get_or_load(CacheCategory::User, 9, || async { Err("db down") })
            .await;
        assert_eq!(result, Err("db down"));
        assert!(!cache.accessor().exists("user:9").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_skips_write_back() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Err(CacheError::ConnectionUnavailable("degraded".to_string())));
        store.expect_set_ex().never();
        store.expect_pool_status().returning(PoolStatus::default);
        let accessor = CacheAccessor::new(Arc::new(store), Duration::from_millis(100));
        let cache = CacheService::new(accessor, CacheKeys::new());

        let value = cache.user(1, || async { Some(5u32) }).await;
        assert_eq!(value, Some(5));
        assert_eq!(cache.statistics().errors, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_overwritten() {
        let cache = memory_service();
        assert!(cache.put(CacheCategory::Item, 3, "not a number").await);

        let value = cache.item(3, || async { Some(30u32) }).await;
        assert_eq!(value, Some(30));
        assert_eq!(cache.accessor().get::<u32>("item:3").await, Lookup::Hit(30));
    }

    #[tokio::test]
    async fn test_search_normalizes_query() {
        let cache = memory_service();
        cache.search("  Spicy   RAMEN ", || async { Some(vec![1u64, 2]) }).await;

        assert!(cache.accessor().exists("search:spicy ramen").await.unwrap());
        let again: Option<Vec<u64>> = cache
            .search("spicy ramen", || async { None })
            .await;
        assert_eq!(again, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_user_orders_key() {
        let cache = memory_service();
        cache.user_orders(5, || async { Some(vec![10u64]) }).await;
        assert!(cache.accessor().exists("order:list:user:5").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_without_dependents_keeps_lists() {
        let cache = memory_service();
        cache.put(CacheCategory::Order, 1, &"pending").await;
        cache.cache_list(CacheCategory::OrderList, "user:5", &[1u64]).await;

        let outcome = cache.invalidate(CacheCategory::Order, 1).await;
        assert_eq!(
            outcome,
            Invalidation {
                removed: true,
                lists_removed: 0
            }
        );
        assert!(cache.accessor().exists("order:list:user:5").await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_marks_unhealthy() {
        let cache = memory_service();
        assert!(cache.is_healthy().await);
        assert!(cache.shutdown().await);
        assert!(!cache.is_healthy().await);
    }
}
