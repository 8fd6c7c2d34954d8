//! Redis connection pool management.
//!
//! The pool is optional infrastructure: when Redis cannot be reached at
//! startup the manager settles into a degraded state and every checkout
//! fails fast with [`CacheError::ConnectionUnavailable`].

use crate::{CacheError, CacheResult};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use parking_lot::{Mutex, RwLock};
use platter_config::RedisConfig;
use serde::Serialize;
use std::cell::Cell;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Upper bound on open connections.
    pub max_size: usize,
    /// Connections currently open.
    pub size: usize,
    /// Connections checked out.
    pub active: usize,
    /// Connections idle in the pool.
    pub idle: usize,
}

/// Eviction sweep parameters.
#[derive(Debug, Clone, Copy)]
struct SweepSettings {
    interval: Duration,
    min_evictable_idle: Duration,
    max_idle: usize,
    min_idle: usize,
    evict_idle: bool,
}

impl SweepSettings {
    fn from_config(config: &RedisConfig) -> Self {
        Self {
            interval: config.eviction_interval(),
            min_evictable_idle: config.min_evictable_idle(),
            max_idle: config.max_idle,
            min_idle: config.min_idle,
            evict_idle: config.test_while_idle,
        }
    }

    /// Whether an idle connection survives the sweep, given how many were
    /// already kept.
    fn keeps(&self, idle_for: Duration, kept: usize) -> bool {
        let stale = self.evict_idle && idle_for >= self.min_evictable_idle;
        !stale && kept < self.max_idle
    }
}

enum PoolState {
    Ready(Pool),
    Disabled,
    Degraded(String),
    Closed,
}

/// Owner of the bounded Redis connection pool.
pub struct ConnectionPoolManager {
    state: RwLock<PoolState>,
    timeout: Duration,
    discard_broken: bool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPoolManager {
    /// Connects to Redis as configured.
    ///
    /// Never fails: an unusable configuration or an unreachable server
    /// yields a degraded manager and a warning in the log.
    pub async fn connect(config: &RedisConfig) -> Self {
        if !config.enabled {
            info!("Redis cache disabled by configuration");
            return Self::disabled();
        }

        info!(
            addr = %config.display_addr(),
            max_total = config.max_total,
            "Creating Redis connection pool..."
        );

        if !config.test_on_borrow {
            debug!("test_on_borrow=false ignored, checkouts are always validated");
        }

        let pool = match Self::build_pool(config) {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "Failed to create Redis pool, cache running in degraded mode");
                return Self::with_state(config, PoolState::Degraded(e.to_string()));
            }
        };

        if let Err(e) = probe(&pool, config.timeout()).await {
            warn!(
                addr = %config.display_addr(),
                error = %e,
                "Redis unreachable, cache running in degraded mode"
            );
            pool.close();
            return Self::with_state(config, PoolState::Degraded(e.to_string()));
        }

        let settings = SweepSettings::from_config(config);
        top_up(&pool, settings.min_idle).await;

        let manager = Self::with_state(config, PoolState::Ready(pool.clone()));
        *manager.sweeper.lock() = Some(tokio::spawn(run_sweeper(pool, settings)));

        info!("Redis connection pool created successfully");
        manager
    }

    /// A manager whose every checkout reports the cache as disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            state: RwLock::new(PoolState::Disabled),
            timeout: Duration::from_millis(RedisConfig::default().timeout_ms),
            discard_broken: false,
            sweeper: Mutex::new(None),
        }
    }

    fn with_state(config: &RedisConfig, state: PoolState) -> Self {
        Self {
            state: RwLock::new(state),
            timeout: config.timeout(),
            discard_broken: config.test_on_return,
            sweeper: Mutex::new(None),
        }
    }

    fn build_pool(config: &RedisConfig) -> CacheResult<Pool> {
        let url = config
            .connection_url()
            .map_err(|e| CacheError::Backend(format!("Invalid Redis URL: {}", e)))?;
        let timeout = Some(config.timeout());

        Config::from_url(url)
            .builder()
            .map_err(|e| CacheError::Backend(format!("Invalid Redis config: {}", e)))?
            .max_size(config.max_total)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| CacheError::Backend(format!("Failed to create pool: {}", e)))
    }

    fn pool(&self) -> CacheResult<Pool> {
        match &*self.state.read() {
            PoolState::Ready(pool) => Ok(pool.clone()),
            PoolState::Disabled => Err(CacheError::ConnectionUnavailable(
                "cache is disabled".to_string(),
            )),
            PoolState::Degraded(reason) => Err(CacheError::ConnectionUnavailable(format!(
                "pool degraded: {}",
                reason
            ))),
            PoolState::Closed => Err(CacheError::ConnectionUnavailable(
                "pool is closed".to_string(),
            )),
        }
    }

    /// Checks out a connection.
    ///
    /// The connection goes back to the pool when dropped, whichever way the
    /// caller exits. Waiting for a free slot is bounded by the per-call
    /// timeout.
    pub async fn acquire(&self) -> CacheResult<Connection> {
        let pool = self.pool()?;
        pool.get().await.map_err(|e| {
            CacheError::ConnectionUnavailable(format!("Failed to get Redis connection: {}", e))
        })
    }

    /// Handles a connection whose last command failed.
    ///
    /// With `test_on_return` set, connections that hit an I/O error are
    /// detached so they never go back to the pool.
    pub fn release_failed(&self, conn: Connection, error: &redis::RedisError) {
        if self.should_discard(error) {
            drop(Connection::take(conn));
            debug!(error = %error, "Discarded broken Redis connection");
        }
    }

    fn should_discard(&self, error: &redis::RedisError) -> bool {
        self.discard_broken && (error.is_io_error() || error.is_connection_dropped())
    }

    /// `PING` round trip bounded by the per-call timeout.
    pub async fn ping(&self) -> CacheResult<()> {
        let pool = self.pool()?;
        probe(&pool, self.timeout).await
    }

    /// Readiness probe.
    pub async fn is_healthy(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// True when a pool exists and has not been closed.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(&*self.state.read(), PoolState::Ready(_))
    }

    /// True when the manager gave up on Redis at startup.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(&*self.state.read(), PoolState::Degraded(_))
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current pool occupancy; all zeros without a pool.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        match &*self.state.read() {
            PoolState::Ready(pool) => {
                let status = pool.status();
                PoolStatus {
                    max_size: status.max_size,
                    size: status.size,
                    active: status.size.saturating_sub(status.available),
                    idle: status.available,
                }
            }
            PoolState::Disabled | PoolState::Degraded(_) | PoolState::Closed => {
                PoolStatus::default()
            }
        }
    }

    /// Closes the pool and stops the eviction sweep.
    ///
    /// Returns true only for the call that actually released a live pool.
    pub fn close(&self) -> bool {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        let previous = std::mem::replace(&mut *self.state.write(), PoolState::Closed);
        match previous {
            PoolState::Ready(pool) => {
                info!("Closing Redis connection pool...");
                pool.close();
                info!("Redis connection pool closed");
                true
            }
            PoolState::Disabled | PoolState::Degraded(_) | PoolState::Closed => false,
        }
    }
}

impl Drop for ConnectionPoolManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.read() {
            PoolState::Ready(_) => "ready",
            PoolState::Disabled => "disabled",
            PoolState::Degraded(_) => "degraded",
            PoolState::Closed => "closed",
        };
        f.debug_struct("ConnectionPoolManager")
            .field("state", &state)
            .field("status", &self.status())
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn probe(pool: &Pool, timeout: Duration) -> CacheResult<()> {
    let round_trip = async {
        let mut conn = pool.get().await.map_err(|e| {
            CacheError::ConnectionUnavailable(format!("Failed to get Redis connection: {}", e))
        })?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok::<(), CacheError>(())
    };

    tokio::time::timeout(timeout, round_trip)
        .await
        .map_err(|_| CacheError::Timeout(timeout))?
}

/// Opens connections until at least `min_idle` exist.
async fn top_up(pool: &Pool, min_idle: usize) {
    if pool.status().size >= min_idle {
        return;
    }

    let checkouts = futures::future::join_all((0..min_idle).map(|_| pool.get())).await;
    let opened = checkouts.iter().filter(|c| c.is_ok()).count();
    drop(checkouts);

    debug!(opened, min_idle, "Topped up idle Redis connections");
}

/// Drops stale idle connections and caps the idle set at `max_idle`.
fn prune_idle(pool: &Pool, settings: SweepSettings) -> usize {
    let before = pool.status().size;
    let kept = Cell::new(0usize);

    pool.retain(|_, metrics| {
        let keep = settings.keeps(metrics.last_used(), kept.get());
        if keep {
            kept.set(kept.get() + 1);
        }
        keep
    });

    before.saturating_sub(pool.status().size)
}

async fn run_sweeper(pool: Pool, settings: SweepSettings) {
    let mut ticker = tokio::time::interval(settings.interval);
    // the first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let evicted = prune_idle(&pool, settings);
        if evicted > 0 {
            debug!(evicted, "Evicted idle Redis connections");
        }
        top_up(&pool, settings.min_idle).await;
    }
}
