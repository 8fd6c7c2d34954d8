//! Application configuration structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Redis cache configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "platter".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Which store implementation backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis server through a bounded connection pool.
    #[default]
    Redis,
    /// Process-local map; for development and tests.
    Memory,
}

/// Redis cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Enable the cache. When false every read goes straight to the fallback.
    pub enabled: bool,
    /// Store implementation.
    pub backend: StoreBackend,
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Optional ACL username.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Per-call timeout in milliseconds (connect, wait for a slot, command).
    pub timeout_ms: u64,
    /// Logical database index.
    pub database: u8,
    /// Maximum number of connections, checked out or idle.
    pub max_total: usize,
    /// Maximum number of idle connections kept after an eviction sweep.
    pub max_idle: usize,
    /// Minimum number of idle connections the sweep tops the pool up to.
    pub min_idle: usize,
    /// Validate connections with a PING when they are borrowed.
    ///
    /// The pool always does this on checkout; `false` is accepted but has
    /// no effect.
    pub test_on_borrow: bool,
    /// Drop connections that saw an error instead of returning them.
    pub test_on_return: bool,
    /// Let the eviction sweep prune idle connections.
    pub test_while_idle: bool,
    /// Interval between eviction sweeps in seconds.
    pub eviction_interval_secs: u64,
    /// Idle time after which a connection may be evicted, in seconds.
    pub min_evictable_idle_secs: u64,
    /// Optional prefix prepended to every key (`<prefix>:<category>:<id>`).
    pub key_prefix: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: StoreBackend::Redis,
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            timeout_ms: 2000,
            database: 0,
            max_total: 20,
            max_idle: 10,
            min_idle: 2,
            test_on_borrow: true,
            test_on_return: true,
            test_while_idle: true,
            eviction_interval_secs: 30,
            min_evictable_idle_secs: 60,
            key_prefix: None,
        }
    }
}

impl RedisConfig {
    /// Returns the per-call timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the eviction sweep interval as a Duration.
    #[must_use]
    pub const fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Returns the minimum evictable idle time as a Duration.
    #[must_use]
    pub const fn min_evictable_idle(&self) -> Duration {
        Duration::from_secs(self.min_evictable_idle_secs)
    }

    /// Builds the `redis://` connection URL, percent-encoding credentials.
    pub fn connection_url(&self) -> Result<String, url::ParseError> {
        let mut url = Url::parse(&format!(
            "redis://{}:{}/{}",
            self.host, self.port, self.database
        ))?;

        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            // Only fails for URLs without a host, which the format above rules out.
            let _ = url.set_username(username);
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            let _ = url.set_password(Some(password));
        }

        Ok(url.into())
    }

    /// Host and port for log lines; never includes credentials.
    #[must_use]
    pub fn display_addr(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
    /// Install a Prometheus recorder for the `metrics` facade.
    pub metrics_enabled: bool,
    /// Address the Prometheus exporter listens on.
    pub metrics_addr: String,
    /// Interval between cache statistics log lines, in seconds. 0 disables it.
    pub stats_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_addr: "0.0.0.0:9464".to_string(),
            stats_interval_secs: 60,
        }
    }
}

impl ObservabilityConfig {
    /// Returns the statistics interval, or `None` when reporting is off.
    #[must_use]
    pub const fn stats_interval(&self) -> Option<Duration> {
        if self.stats_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.stats_interval_secs))
        }
    }
}
