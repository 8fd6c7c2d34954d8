//! Configuration validation module.
//!
//! Collects every problem in one pass so a misconfigured deployment fails
//! at startup with the full list instead of one error at a time.

use crate::{AppConfig, ObservabilityConfig, RedisConfig};
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Port number is invalid (must be 1-65535).
    InvalidPort { name: String, value: u16 },
    /// Pool bounds are inconsistent (lower bound above upper bound).
    InvalidPoolBounds {
        lower: String,
        lower_value: usize,
        upper: String,
        upper_value: usize,
    },
    /// Pool size is zero or exceeds the allowed maximum.
    InvalidPoolSize { value: usize, maximum: usize },
    /// Redis logical database index is out of range.
    InvalidDatabase { value: u8, maximum: u8 },
    /// URL could not be built from host/port/credentials.
    InvalidUrl { url_type: String, message: String },
    /// Timeout or interval must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Key prefix contains a glob metacharacter.
    InvalidKeyPrefix { value: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { name, value } => {
                write!(f, "Invalid port for {}: {} (must be 1-65535)", name, value)
            }
            Self::InvalidPoolBounds {
                lower,
                lower_value,
                upper,
                upper_value,
            } => {
                write!(
                    f,
                    "Invalid pool bounds: {} ({}) cannot be greater than {} ({})",
                    lower, lower_value, upper, upper_value
                )
            }
            Self::InvalidPoolSize { value, maximum } => {
                write!(f, "Invalid pool size {} (must be 1-{})", value, maximum)
            }
            Self::InvalidDatabase { value, maximum } => {
                write!(f, "Invalid Redis database index {} (must be 0-{})", value, maximum)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::InvalidKeyPrefix { value } => {
                write!(
                    f,
                    "Invalid key prefix: '{}' (must not contain *, ?, [, ] or \\)",
                    value
                )
            }
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                    value
                )
            }
            Self::InvalidLogFormat { value } => {
                write!(f, "Invalid log format: '{}' (valid: pretty, json)", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: usize = 1000;
    /// Highest logical database index on a default Redis build.
    const MAX_DATABASE: u8 = 15;
    /// Characters with a meaning in Redis key patterns.
    const GLOB_METACHARACTERS: &'static [char] = &['*', '?', '[', ']', '\\'];
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
    /// Valid log formats.
    const VALID_LOG_FORMATS: &'static [&'static str] = &["pretty", "json"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_redis(&config.redis, &mut errors);
        Self::validate_observability(&config.observability, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates Redis configuration.
    fn validate_redis(config: &RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        if !config.enabled {
            return;
        }

        if config.port == 0 {
            errors.push(ConfigValidationError::InvalidPort {
                name: "redis.port".to_string(),
                value: config.port,
            });
        }

        if config.database > Self::MAX_DATABASE {
            errors.push(ConfigValidationError::InvalidDatabase {
                value: config.database,
                maximum: Self::MAX_DATABASE,
            });
        }

        if let Err(e) = config.connection_url() {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            });
        }

        if config.max_total == 0 || config.max_total > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::InvalidPoolSize {
                value: config.max_total,
                maximum: Self::MAX_POOL_SIZE,
            });
        }
        if config.max_idle > config.max_total {
            errors.push(ConfigValidationError::InvalidPoolBounds {
                lower: "redis.max_idle".to_string(),
                lower_value: config.max_idle,
                upper: "redis.max_total".to_string(),
                upper_value: config.max_total,
            });
        }
        if config.min_idle > config.max_idle {
            errors.push(ConfigValidationError::InvalidPoolBounds {
                lower: "redis.min_idle".to_string(),
                lower_value: config.min_idle,
                upper: "redis.max_idle".to_string(),
                upper_value: config.max_idle,
            });
        }

        for (name, value) in [
            ("redis.timeout_ms", config.timeout_ms),
            ("redis.eviction_interval_secs", config.eviction_interval_secs),
        ] {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveTimeout {
                    name: name.to_string(),
                    value,
                });
            }
        }

        if let Some(prefix) = &config.key_prefix {
            if prefix.contains(Self::GLOB_METACHARACTERS) {
                errors.push(ConfigValidationError::InvalidKeyPrefix {
                    value: prefix.clone(),
                });
            }
        }
    }

    /// Validates observability configuration.
    fn validate_observability(
        config: &ObservabilityConfig,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        let format = config.log_format.to_lowercase();
        if !Self::VALID_LOG_FORMATS.contains(&format.as_str()) {
            errors.push(ConfigValidationError::InvalidLogFormat {
                value: config.log_format.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_pool_errors() {
        let mut config = AppConfig::default();
        config.redis.max_total = 4;
        config.redis.max_idle = 8;
        config.redis.min_idle = 9;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ConfigValidationError::InvalidPoolBounds { .. })));
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = AppConfig::default();
        config.redis.max_total = 0;
        config.redis.max_idle = 0;
        config.redis.min_idle = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigValidationError::InvalidPoolSize { value: 0, maximum: 1000 }]
        );
    }

    #[test]
    fn test_zero_timeout_and_port() {
        let mut config = AppConfig::default();
        config.redis.port = 0;
        config.redis.timeout_ms = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors.contains(&ConfigValidationError::InvalidPort {
            name: "redis.port".to_string(),
            value: 0,
        }));
        assert!(errors.contains(&ConfigValidationError::NonPositiveTimeout {
            name: "redis.timeout_ms".to_string(),
            value: 0,
        }));
    }

    #[test]
    fn test_disabled_redis_skips_checks() {
        let mut config = AppConfig::default();
        config.redis.enabled = false;
        config.redis.port = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_database_out_of_range() {
        let mut config = AppConfig::default();
        config.redis.database = 16;
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigValidationError::InvalidDatabase { value: 16, maximum: 15 }]
        );
    }

    #[test]
    fn test_key_prefix_rejects_glob_metacharacters() {
        let mut config = AppConfig::default();
        config.redis.key_prefix = Some("tenant-?".to_string());

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigValidationError::InvalidKeyPrefix {
                value: "tenant-?".to_string()
            }]
        );

        config.redis.key_prefix = Some("tenant-a".to_string());
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_observability() {
        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();
        config.observability.log_format = "xml".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("verbose"));
        assert!(errors[1].to_string().contains("xml"));
    }
}
