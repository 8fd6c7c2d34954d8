//! Result type aliases for Platter.

use crate::PlatterError;

/// A specialized `Result` type for Platter operations.
pub type PlatterResult<T> = Result<T, PlatterError>;
