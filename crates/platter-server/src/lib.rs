//! # Platter Server Library
//!
//! Startup helpers and background tasks for the process hosting the
//! shared [`CacheService`](platter_cache::CacheService).

pub mod reporter;
pub mod startup;
