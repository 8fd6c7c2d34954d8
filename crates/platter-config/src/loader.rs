//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use platter_core::{PlatterError, PlatterResult};
use std::path::Path;
use tracing::{debug, info, warn};

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a loader reading from `config_dir`.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `PLATTER__` prefix
    ///    (`PLATTER__REDIS__HOST=cache.internal`)
    pub fn new(config_dir: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Loader for the default location (`./config`).
    #[must_use]
    pub fn from_default_location() -> Self {
        Self::new("./config")
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> PlatterResult<AppConfig> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("PLATTER_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        info!(environment = %environment, config_dir = %self.config_dir, "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", self.config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PLATTER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error_to_platter_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Runs the validator and folds every problem into one error.
    fn validate_config(config: &AppConfig) -> PlatterResult<()> {
        if config.app.environment == "production"
            && config.redis.password.is_none()
            && config.redis.enabled
        {
            warn!("Redis password is not set in production");
        }

        ConfigValidator::validate(config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            PlatterError::Configuration(joined)
        })
    }
}

fn config_error_to_platter_error(err: ConfigError) -> PlatterError {
    PlatterError::Configuration(err.to_string())
}
