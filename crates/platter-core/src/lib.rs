//! # Platter Core
//!
//! Error definitions, result aliases and logging initialisation shared by
//! every crate in the Platter workspace.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
