//! End-to-end behaviour of the cache-aside service over the in-process
//! store and over a Redis store whose pool is unavailable.

use async_trait::async_trait;
use platter_cache::{
    CacheAccessor, CacheCategory, CacheKeys, CacheResult, CacheService, CacheStore, CacheWarmer,
    ConnectionPoolManager, Invalidation, KeyTtl, MemoryStore, PoolStatus, RedisStore,
};
use platter_config::{RedisConfig, StoreBackend};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Restaurant {
    id: u64,
    name: String,
    rating: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    email: String,
}

fn pasta_place() -> Restaurant {
    Restaurant {
        id: 7,
        name: "Pasta Place".to_string(),
        rating: 4.5,
    }
}

fn memory_cache() -> (Arc<MemoryStore>, CacheService) {
    let store = Arc::new(MemoryStore::new());
    let accessor = CacheAccessor::new(store.clone(), Duration::from_secs(1));
    (store, CacheService::new(accessor, CacheKeys::new()))
}

fn unavailable_cache() -> CacheService {
    let store = RedisStore::new(Arc::new(ConnectionPoolManager::disabled()));
    let accessor = CacheAccessor::new(Arc::new(store), Duration::from_millis(200));
    CacheService::new(accessor, CacheKeys::new())
}

/// Counts fallback invocations.
#[derive(Default)]
struct Source {
    calls: AtomicUsize,
}

impl Source {
    async fn restaurant(&self, id: u64) -> Option<Restaurant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (id == 7).then(pasta_place)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn populate_then_hit() {
    let (_, cache) = memory_cache();
    let source = Source::default();

    let first = cache.restaurant(7, || source.restaurant(7)).await;
    assert_eq!(first, Some(pasta_place()));
    assert_eq!(source.calls(), 1);

    let second = cache.restaurant(7, || source.restaurant(7)).await;
    assert_eq!(second, Some(pasta_place()));
    assert_eq!(source.calls(), 1, "second read must be served from cache");

    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses, stats.errors), (1, 1, 0));
}

#[tokio::test]
async fn invalidate_then_reload() {
    let (_, cache) = memory_cache();
    let source = Source::default();

    cache.restaurant(7, || source.restaurant(7)).await;
    let outcome = cache.invalidate(CacheCategory::Restaurant, 7).await;
    assert!(outcome.removed);

    let reloaded = cache.restaurant(7, || source.restaurant(7)).await;
    assert_eq!(reloaded, Some(pasta_place()));
    assert_eq!(source.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_loads_agree() {
    let (_, cache) = memory_cache();
    let cache = Arc::new(cache);
    let source = Arc::new(Source::default());

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            let source = source.clone();
            tokio::spawn(async move {
                cache
                    .restaurant(7, || async move { source.restaurant(7).await })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), Some(pasta_place()));
    }

    // no request coalescing: anywhere from one to every caller may load
    let calls = source.calls();
    assert!((1..=10).contains(&calls), "fallback ran {} times", calls);
}

#[tokio::test]
async fn cached_value_equals_fallback_value() {
    let (_, cache) = memory_cache();
    let user = User {
        id: 3,
        email: "ada@example.com".to_string(),
    };

    let expected = user.clone();
    let loaded = cache.user(3, || async move { Some(expected) }).await;
    let cached: Option<User> = cache.user(3, || async { None }).await;

    assert_eq!(loaded, Some(user.clone()));
    assert_eq!(cached, Some(user));
}

#[tokio::test]
async fn invalidation_is_idempotent() {
    let (store, cache) = memory_cache();
    cache.put(CacheCategory::Restaurant, 7, &pasta_place()).await;
    cache
        .cache_list(CacheCategory::RestaurantList, "city=rome", &vec![7u64])
        .await;

    let first = cache.invalidate(CacheCategory::Restaurant, 7).await;
    let second = cache.invalidate(CacheCategory::Restaurant, 7).await;

    assert_eq!(
        first,
        Invalidation {
            removed: true,
            lists_removed: 1
        }
    );
    assert_eq!(second, Invalidation::default());
    assert!(store.keys().is_empty());
    assert_eq!(cache.statistics().errors, 0);
}

#[tokio::test]
async fn unavailable_pool_degrades_to_fallback() {
    let cache = unavailable_cache();
    let source = Source::default();

    let direct = source.restaurant(7).await;
    let through_cache = cache.restaurant(7, || source.restaurant(7)).await;

    assert_eq!(through_cache, direct);
    assert_eq!(source.calls(), 2);
    assert!(!cache.is_healthy().await);
    assert!(!cache.put(CacheCategory::User, 1, &1u8).await);
    assert_eq!(
        cache.invalidate(CacheCategory::Analytics, "weekly").await,
        Invalidation::default()
    );

    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses), (0, 0));
    assert!(stats.errors >= 1);
}

#[tokio::test]
async fn unreachable_redis_from_config_degrades() {
    let config = RedisConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        timeout_ms: 200,
        min_idle: 0,
        ..RedisConfig::default()
    };
    let cache = CacheService::from_config(&config).await;

    let value = cache.session("abc", || async { Some("token".to_string()) }).await;
    assert_eq!(value, Some("token".to_string()));
    assert!(!cache.is_healthy().await);
    assert!(cache.shutdown().await);
}

#[tokio::test]
async fn ttl_follows_category_tier() {
    let (_, cache) = memory_cache();

    cache.user(1, || async { Some(1u32) }).await;
    cache.session("s-1", || async { Some(2u32) }).await;
    cache.stats("daily-orders", || async { Some(3u32) }).await;

    let user_ttl = cache.accessor().ttl("user:1").await.unwrap();
    let session_ttl = cache.accessor().ttl("session:s-1").await.unwrap();
    let stats_ttl = cache.accessor().ttl("stats:daily-orders").await.unwrap();

    assert!(matches!(user_ttl, KeyTtl::Expires(s) if s > 0 && s <= 1800));
    assert!(matches!(session_ttl, KeyTtl::Expires(s) if s > 0 && s <= 300));
    assert!(matches!(stats_ttl, KeyTtl::Expires(s) if s > 3600 && s <= 86_400));
}

#[tokio::test]
async fn pattern_delete_scope() {
    let (store, cache) = memory_cache();
    let accessor = cache.accessor();

    for key in [
        "restaurant:list:a",
        "restaurant:list:b",
        "restaurant:list:c",
        "restaurant:7",
        "analytics:list:a",
        "order:list:user:1",
    ] {
        accessor.set(key, &1u8, 60).await.unwrap();
    }

    let deleted = accessor.delete_by_pattern("restaurant:list:*").await.unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(
        store.keys(),
        vec!["analytics:list:a", "order:list:user:1", "restaurant:7"]
    );
}

#[tokio::test]
async fn statistics_accounting() {
    let (_, cache) = memory_cache();
    let accessor = cache.accessor();

    accessor.set("item:1", &10u32, 60).await.unwrap();
    accessor.set("item:2", &"ten", 60).await.unwrap();

    // 3 hits
    for _ in 0..3 {
        assert!(accessor.get::<u32>("item:1").await.is_hit());
    }
    // 1 miss
    assert!(!accessor.get::<u32>("item:9").await.is_hit());
    // 2 errors
    accessor.get::<u32>("item:2").await;
    accessor.get::<u32>("item:2").await;

    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses, stats.errors), (3, 1, 2));
    assert_eq!(stats.hit_rate_percent, 75.0);

    cache.reset_statistics();
    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses, stats.errors), (0, 0, 0));
    assert_eq!(stats.hit_rate_percent, 0.0);
}

#[tokio::test]
async fn absent_results_are_not_cached() {
    let (store, cache) = memory_cache();
    let source = Source::default();

    for _ in 0..3 {
        assert_eq!(cache.restaurant(404, || source.restaurant(404)).await, None);
    }

    assert_eq!(source.calls(), 3);
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn list_invalidation_only_for_dependent_categories() {
    let (store, cache) = memory_cache();
    cache.cache_list(CacheCategory::Analytics, "weekly", &[1u8]).await;
    cache.cache_list(CacheCategory::OrderList, "user:1", &[1u8]).await;
    cache.put(CacheCategory::User, 1, &"ada").await;

    let user = cache.invalidate(CacheCategory::User, 1).await;
    assert_eq!(user.lists_removed, 0);

    let analytics = cache.invalidate(CacheCategory::Analytics, "weekly").await;
    assert!(!analytics.removed);
    assert_eq!(analytics.lists_removed, 1);

    assert_eq!(store.keys(), vec!["order:list:user:1"]);
}

#[tokio::test]
async fn list_reads_and_explicit_list_invalidation() {
    let (_, cache) = memory_cache();
    let ids = vec![1u64, 2, 3];

    let fresh = ids.clone();
    let loaded = cache
        .restaurant_list("cuisine=thai", || async move { Some(fresh) })
        .await;
    assert_eq!(loaded, Some(ids.clone()));
    assert_eq!(
        cache.get_list::<Vec<u64>>(CacheCategory::RestaurantList, "cuisine=thai").await,
        Some(ids)
    );

    assert_eq!(cache.invalidate_lists(CacheCategory::Restaurant).await, 1);
    assert_eq!(
        cache.get_list::<Vec<u64>>(CacheCategory::RestaurantList, "cuisine=thai").await,
        None
    );
}

#[tokio::test]
async fn key_prefix_scopes_keys_and_clear_all() {
    let shared = Arc::new(MemoryStore::new());
    shared.set_ex("other-app:user:1", "1", 60).await.unwrap();

    let accessor = CacheAccessor::new(shared.clone(), Duration::from_secs(1));
    let cache = CacheService::new(accessor, CacheKeys::with_prefix("platter"));

    cache.user(1, || async { Some(1u8) }).await;
    cache.menu_items(4, || async { Some(vec![1u8]) }).await;
    assert_eq!(
        shared.keys(),
        vec!["other-app:user:1", "platter:menu:4", "platter:user:1"]
    );

    assert!(cache.clear_all().await);
    assert_eq!(shared.keys(), vec!["other-app:user:1"]);
}

#[tokio::test]
async fn clear_all_without_prefix_flushes() {
    let (store, cache) = memory_cache();
    cache.put(CacheCategory::Order, 1, &"placed").await;
    cache.put(CacheCategory::Item, 2, &"soup").await;

    assert!(cache.clear_all().await);
    assert!(store.keys().is_empty());
}

struct PopularRestaurants;

#[async_trait]
impl CacheWarmer for PopularRestaurants {
    async fn warm(&self, cache: &CacheService) -> usize {
        let mut written = 0;
        for id in [1u64, 2, 3] {
            let restaurant = Restaurant {
                id,
                name: format!("Popular #{}", id),
                rating: 5.0,
            };
            if cache.put(CacheCategory::Restaurant, id, &restaurant).await {
                written += 1;
            }
        }
        written
    }

    fn name(&self) -> &str {
        "popular-restaurants"
    }
}

#[tokio::test]
async fn warm_up_runs_registered_warmers() {
    let (_, cache) = memory_cache();
    assert_eq!(cache.warm_up().await, 0);

    let cache = cache.with_warmer(Arc::new(PopularRestaurants));
    assert_eq!(cache.warm_up().await, 3);

    let hit: Option<Restaurant> = cache.restaurant(2, || async { None }).await;
    assert_eq!(hit.map(|r| r.name), Some("Popular #2".to_string()));
}

#[tokio::test]
async fn shutdown_happens_once() {
    let (store, cache) = memory_cache();
    assert!(cache.is_healthy().await);

    assert!(cache.shutdown().await);
    assert!(!cache.shutdown().await);
    assert!(cache.is_shut_down());
    assert!(store.ping().await.is_err());

    // reads keep working through the fallback
    let value = cache.item(1, || async { Some(11u32) }).await;
    assert_eq!(value, Some(11));
}

#[tokio::test]
async fn memory_backend_from_config() {
    let config = RedisConfig {
        backend: StoreBackend::Memory,
        ..RedisConfig::default()
    };
    let cache = CacheService::from_config(&config).await;

    assert_eq!(cache.accessor().store().backend_name(), "memory");
    assert!(cache.is_healthy().await);
    assert!(cache.put(CacheCategory::Search, "pho", &[1u8]).await);
}

/// Store whose every command stalls forever.
#[derive(Default)]
struct StalledStore {
    writes: AtomicUsize,
}

#[async_trait]
impl CacheStore for StalledStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        std::future::pending().await
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: u64) -> CacheResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        std::future::pending().await
    }

    async fn delete_matching(&self, _pattern: &str) -> CacheResult<u64> {
        std::future::pending().await
    }

    async fn expire(&self, _key: &str, _ttl: u64) -> CacheResult<bool> {
        std::future::pending().await
    }

    async fn ttl(&self, _key: &str) -> CacheResult<KeyTtl> {
        std::future::pending().await
    }

    async fn flush(&self) -> CacheResult<()> {
        std::future::pending().await
    }

    async fn ping(&self) -> CacheResult<()> {
        std::future::pending().await
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus::default()
    }

    async fn close(&self) {}

    fn backend_name(&self) -> &'static str {
        "stalled"
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_store_times_out_to_fallback() {
    let store = Arc::new(StalledStore::default());
    let timeout = Duration::from_millis(100);
    let accessor = CacheAccessor::new(store.clone(), timeout);
    let cache = CacheService::new(accessor, CacheKeys::new());

    let started = tokio::time::Instant::now();
    let value = cache.order(5, || async { Some(5u32) }).await;

    assert_eq!(value, Some(5));
    // one timeout for the read, no write-back attempted afterwards
    assert!(started.elapsed() < timeout * 2);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);

    let stats = cache.statistics();
    assert_eq!((stats.hits, stats.misses, stats.errors), (0, 0, 1));
    assert!(!cache.is_healthy().await);
}

#[tokio::test]
async fn prefix_with_glob_characters_stays_in_its_namespace() {
    let shared = Arc::new(MemoryStore::new());
    shared.set_ex("tenant-b:user:1", "1", 60).await.unwrap();
    shared.set_ex("tenant-b:restaurant:list:all", "[]", 60).await.unwrap();

    let accessor = CacheAccessor::new(shared.clone(), Duration::from_secs(1));
    let cache = CacheService::new(accessor, CacheKeys::with_prefix("tenant-?"));
    cache.put(CacheCategory::User, 1, &1u8).await;
    cache.cache_list(CacheCategory::RestaurantList, "all", &[1u8]).await;

    assert_eq!(cache.invalidate_lists(CacheCategory::Restaurant).await, 1);
    assert!(cache.clear_all().await);
    assert_eq!(
        shared.keys(),
        vec!["tenant-b:restaurant:list:all", "tenant-b:user:1"]
    );
}
