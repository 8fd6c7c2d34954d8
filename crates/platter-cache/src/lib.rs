//! # Platter Cache
//!
//! TTL-tiered cache-aside layer over Redis.
//!
//! Business services call [`CacheService`], which derives a namespaced key
//! from an entity category, reads through [`CacheAccessor`] and, on a miss,
//! awaits a caller-supplied fallback and writes the result back with the
//! category's TTL. Every cache failure degrades to a miss; losing Redis
//! costs latency, never correctness.

pub mod accessor;
pub mod category;
pub mod codec;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod pool;
pub mod service;
pub mod stats;
pub mod store;

pub use accessor::*;
pub use category::*;
pub use codec::*;
pub use error::*;
pub use keys::*;
pub use self::metrics::{register_metrics, CacheMetrics};
pub use pool::{ConnectionPoolManager, PoolStatus};
pub use service::*;
pub use stats::*;
pub use store::{glob_match, CacheStore, MemoryStore, RedisStore};
