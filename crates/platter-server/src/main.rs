//! # Platter Server
//!
//! Hosts the process-wide cache service: loads configuration, connects the
//! cache (degrading if Redis is down), reports statistics periodically and
//! shuts the cache down exactly once on Ctrl+C or SIGTERM.

use platter_cache::CacheService;
use platter_config::{AppConfig, ConfigLoader};
use platter_core::telemetry::{init_logging, LogFormat};
use platter_core::{ErrorResponse, PlatterResult};
use platter_server::{reporter, startup};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ConfigLoader::from_default_location().load() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", LogFormat::default());
            fail(&e);
        }
    };

    let format = config
        .observability
        .log_format
        .parse::<LogFormat>()
        .unwrap_or_default();
    init_logging(&config.observability.log_level, format);

    startup::print_banner();
    info!("Starting Platter cache server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        fail(&e);
    }
}

fn fail(e: &platter_core::PlatterError) -> ! {
    let response = ErrorResponse::from(e);
    error!(code = %response.code, "Application error: {}", response.message);
    std::process::exit(1);
}

async fn run(config: AppConfig) -> PlatterResult<()> {
    startup::print_startup_info(&config);

    if config.observability.metrics_enabled {
        startup::install_metrics_exporter(&config.observability.metrics_addr)?;
    }

    let cache = Arc::new(CacheService::from_config(&config.redis).await);

    let warmed = cache.warm_up().await;
    if cache.is_healthy().await {
        info!(warmed, "Cache ready");
    } else {
        warn!("Cache unavailable, serving every read from the source of record");
    }

    let reporter = config
        .observability
        .stats_interval()
        .map(|interval| reporter::spawn_stats_reporter(cache.clone(), interval));

    shutdown_signal().await;

    if let Some(handle) = reporter {
        handle.abort();
    }

    let stats = reporter::report(&cache).await;
    cache.shutdown().await;
    info!(statistics = %reporter::summary(&stats), "Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
