//! Redis-backed store.

use super::CacheStore;
use crate::{CacheResult, ConnectionPoolManager, KeyTtl, PoolStatus};
use async_trait::async_trait;
use deadpool_redis::Connection;
use redis::{AsyncCommands, RedisResult};
use std::sync::Arc;
use tracing::debug;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Store running every command on one pooled Redis connection.
#[derive(Debug, Clone)]
pub struct RedisStore {
    pool: Arc<ConnectionPoolManager>,
}

impl RedisStore {
    /// Creates a store on top of a pool manager.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPoolManager>) -> Self {
        Self { pool }
    }

    /// The underlying pool manager.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPoolManager> {
        &self.pool
    }

    /// Hands the connection back (or discards it) and converts the reply.
    fn finish<T>(&self, conn: Connection, result: RedisResult<T>) -> CacheResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.pool.release_failed(conn, &e);
                Err(e.into())
            }
        }
    }

    async fn scan(conn: &mut Connection, pattern: &str) -> RedisResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut **conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

fn clamp_secs(ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs).unwrap_or(i64::MAX)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<Option<String>> = conn.get(key).await;
        self.finish(conn, result)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<()> = conn.set_ex(key, value, ttl_secs.max(1)).await;
        self.finish(conn, result)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<bool> = conn.exists(key).await;
        self.finish(conn, result)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<i64> = conn.del(key).await;
        self.finish(conn, result).map(|deleted| deleted > 0)
    }

    async fn delete_matching(&self, pattern: &str) -> CacheResult<u64> {
        let mut conn = self.pool.acquire().await?;

        let keys = match Self::scan(&mut conn, pattern).await {
            Ok(keys) => keys,
            Err(e) => return self.finish(conn, Err(e)),
        };

        if keys.is_empty() {
            debug!(pattern, "No keys matched pattern");
            return Ok(0);
        }

        let result: RedisResult<u64> = conn.del(&keys).await;
        let deleted = self.finish(conn, result)?;
        debug!(pattern, deleted, "Deleted keys matching pattern");
        Ok(deleted)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<bool> = conn.expire(key, clamp_secs(ttl_secs)).await;
        self.finish(conn, result)
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<i64> = conn.ttl(key).await;
        self.finish(conn, result).map(KeyTtl::from_redis)
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut conn = self.pool.acquire().await?;
        let result: RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut *conn).await;
        self.finish(conn, result)
    }

    async fn ping(&self) -> CacheResult<()> {
        self.pool.ping().await
    }

    fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    async fn close(&self) {
        self.pool.close();
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
