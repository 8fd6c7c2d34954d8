//! In-process store with Redis-compatible expiry and glob semantics.

use super::CacheStore;
use crate::{CacheError, CacheResult, KeyTtl, PoolStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Writes between two inline purges of expired entries.
const PURGE_EVERY_WRITES: u64 = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local store used for development and tests.
///
/// Expired entries are dropped on the next access to their key, on a
/// pattern scan, every 1024 writes and by the periodic purge task when one
/// is running.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    closed: AtomicBool,
    writes: AtomicU64,
    purger: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Drops every expired entry and returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Starts a background task purging expired entries every `interval`.
    ///
    /// The task holds only a weak reference and ends with the store. A
    /// second call replaces the running task.
    pub fn spawn_purge_task(self: &Arc<Self>, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(run_purger(Arc::downgrade(self), interval));
        if let Some(previous) = self.purger.lock().replace(handle) {
            previous.abort();
        }
        info!(?interval, "Started memory store purge task");
    }

    fn check_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::ConnectionUnavailable("store is closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// Runs `f` on the entry for `key`, dropping it first if it expired.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> T) -> CacheResult<T> {
        self.check_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(f(entries.get_mut(key)))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_live(key, |entry| entry.map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        self.check_open()?;
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs.max(1));
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_EVERY_WRITES == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged expired entries on write");
            }
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.with_live(key, |entry| entry.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check_open()?;
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn delete_matching(&self, pattern: &str) -> CacheResult<u64> {
        self.check_open()?;
        let now = Instant::now();
        let mut removed = 0u64;
        self.entries.lock().retain(|key, entry| {
            if !glob_match(pattern, key) {
                return true;
            }
            if !entry.is_expired(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<bool> {
        self.with_live(key, |entry| match entry {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.with_live(key, |entry| match entry {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at), ..
            }) => {
                let remaining = at.saturating_duration_since(Instant::now());
                // round up like Redis does for a freshly written key
                let millis = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
                KeyTtl::Expires(millis.div_ceil(1000))
            }
        })
    }

    async fn flush(&self) -> CacheResult<()> {
        self.check_open()?;
        self.entries.lock().clear();
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check_open()
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus::default()
    }

    async fn close(&self) {
        if let Some(handle) = self.purger.lock().take() {
            handle.abort();
        }
        self.closed.store(true, Ordering::Release);
        self.entries.lock().clear();
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.purger.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_purger(store: Weak<MemoryStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(store) = store.upgrade() else {
            break;
        };
        let purged = store.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired entries");
        }
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // position of the last `*` in the pattern and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, tried)) => {
                p = star + 1;
                t = tried + 1;
                backtrack = Some((star, tried + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
