//! Server startup utilities.

use metrics_exporter_prometheus::PrometheusBuilder;
use platter_config::AppConfig;
use platter_core::{PlatterError, PlatterResult};
use std::net::SocketAddr;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    ____  __      __  __
   / __ \/ /___ _/ /_/ /____  _____
  / /_/ / / __ `/ __/ __/ _ \/ ___/
 / ____/ / /_/ / /_/ /_/  __/ /
/_/   /_/\__,_/\__/\__/\___/_/

                  cache layer
    "#);
}

/// Prints where the process is pointed and how it reports.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Environment: {}", config.app.environment);
    if config.redis.enabled {
        info!("Cache:       {:?} at {}", config.redis.backend, config.redis.display_addr());
    } else {
        info!("Cache:       disabled");
    }
    match config.redis.key_prefix.as_deref() {
        Some(prefix) => info!("Key prefix:  {}", prefix),
        None => info!("Key prefix:  (none)"),
    }
    if config.observability.metrics_enabled {
        info!("Metrics:     http://{}/metrics", config.observability.metrics_addr);
    }
    info!("{}", separator);
}

/// Installs the Prometheus recorder and its scrape endpoint.
///
/// Must run inside the tokio runtime.
pub fn install_metrics_exporter(addr: &str) -> PlatterResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| {
            PlatterError::configuration(format!("Invalid metrics address '{}': {}", addr, e))
        })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            PlatterError::internal(format!("Failed to install Prometheus exporter: {}", e))
        })?;

    platter_cache::register_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}
