//! Value encoding for the wire.

use crate::CacheResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Strategy converting typed values to and from stored strings.
pub trait CacheCodec: Send + Sync + 'static {
    /// Encodes `value` for storage.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<String>;

    /// Decodes a stored string into `T`.
    fn decode<T: DeserializeOwned>(&self, raw: &str) -> CacheResult<T>;
}

/// Self-describing JSON encoding.
///
/// Date/time fields go through their `serde` impls; `chrono` types render
/// as RFC 3339 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl CacheCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, raw: &str) -> CacheResult<T> {
        Ok(serde_json::from_str(raw)?)
    }
}
