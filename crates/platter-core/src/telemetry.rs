//! Logging initialisation.
//!
//! Library crates only emit `tracing` events; the host binary decides how
//! they are rendered by calling [`init_logging`] once at startup.

#[cfg(feature = "logging")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use serde::{Deserialize, Serialize};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Builds the default filter directive for a given base level.
#[must_use]
pub fn default_filter(level: &str) -> String {
    format!("{},platter=debug", level)
}

/// Initialize the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Calling this twice is harmless;
/// the second call leaves the first subscriber in place.
#[cfg(feature = "logging")]
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(?format, "Logging initialized");
    }
}

/// Placeholder for when the logging feature is disabled.
#[cfg(not(feature = "logging"))]
pub fn init_logging(_level: &str, _format: LogFormat) {}
