//! Raw string key/value stores behind the accessor.
//!
//! A store works in already-encoded strings and reports every failure as a
//! [`CacheError`](crate::CacheError); typing, timeouts and accounting live in
//! [`CacheAccessor`](crate::CacheAccessor).

mod memory;
mod redis_store;

pub use memory::{glob_match, MemoryStore};
pub use redis_store::RedisStore;

use crate::{CacheResult, KeyTtl, PoolStatus};
use async_trait::async_trait;

/// Minimal command set the cache layer needs from a key/value store.
///
/// Each call uses exactly one connection for its whole duration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads a raw value. `None` when absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Writes a raw value expiring after `ttl_secs`.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Checks whether a key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Deletes a key. True if something was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Deletes every key matching a glob in one batch; returns the count.
    async fn delete_matching(&self, pattern: &str) -> CacheResult<u64>;

    /// Sets a new expiry on an existing key. False if the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;

    /// Removes every key in the store's logical database.
    async fn flush(&self) -> CacheResult<()>;

    /// Round-trip liveness check.
    async fn ping(&self) -> CacheResult<()>;

    /// Connection pool occupancy, zeros for pool-less stores.
    fn pool_status(&self) -> PoolStatus;

    /// Releases the store's resources. Later calls fail as unavailable.
    async fn close(&self);

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
