//! Cache error taxonomy and operation outcomes.

use platter_core::PlatterError;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Everything that can go wrong between the cache layer and its store.
///
/// None of these reach callers of [`CacheService`](crate::CacheService)
/// read paths; they are counted, logged and turned into a miss or no-op.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Pool disabled, degraded, closed or exhausted.
    #[error("Cache connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Value could not be encoded or decoded.
    #[error("Cache serialization failed: {0}")]
    Serialization(String),

    /// Network or protocol failure talking to the store.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// The store did not answer within the per-call timeout.
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// A category name that does not map to any cache category.
    #[error("Unknown cache category: {0}")]
    UnknownCategory(String),
}

impl CacheError {
    /// Short label used for log fields and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionUnavailable(_) => "unavailable",
            Self::Serialization(_) => "serialization",
            Self::Backend(_) => "backend",
            Self::Timeout(_) => "timeout",
            Self::UnknownCategory(_) => "unknown_category",
        }
    }

    /// True when the store could not be reached at all.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConnectionUnavailable(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<CacheError> for PlatterError {
    fn from(err: CacheError) -> Self {
        match &err {
            CacheError::Timeout(_) => Self::Timeout(err.to_string()),
            _ => Self::Cache(err.to_string()),
        }
    }
}

/// Outcome of a typed cache read.
///
/// Keeps "not cached", "store unreachable" and "store misbehaved" apart so
/// callers never mistake one for another.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Value found and decoded.
    Hit(T),
    /// Key absent or expired.
    Miss,
    /// Pool unavailable; the store was not consulted.
    Unavailable,
    /// The store or codec failed.
    Failed(CacheError),
}

impl<T> Lookup<T> {
    /// Returns true for a hit.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Returns the cached value, collapsing every non-hit into `None`.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss | Self::Unavailable | Self::Failed(_) => None,
        }
    }
}

/// Remaining lifetime of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key expires in this many seconds.
    Expires(u64),
    /// Key exists without an expiry.
    Persistent,
    /// Key does not exist.
    Missing,
}

impl KeyTtl {
    /// Maps the raw Redis `TTL` reply (-2 missing, -1 persistent).
    #[must_use]
    pub fn from_redis(reply: i64) -> Self {
        match reply {
            -2 => Self::Missing,
            r if r < 0 => Self::Persistent,
            r => Self::Expires(r.unsigned_abs()),
        }
    }

    /// Seconds left, if the key has an expiry.
    #[must_use]
    pub const fn seconds(&self) -> Option<u64> {
        match self {
            Self::Expires(secs) => Some(*secs),
            Self::Persistent | Self::Missing => None,
        }
    }
}
