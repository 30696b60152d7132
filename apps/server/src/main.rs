//! Airwave Server - Standalone headless server for the Airwave station core.
//!
//! Serves the control API and the `/ws` signaling endpoint, with tracks and
//! playlists loaded from an optional JSON catalog.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use airwave_core::protocol_constants::STATUS_HISTORY_RETENTION;
use airwave_core::{
    bootstrap_services, start_server, AppState, BroadcastStore, Catalog, LoggingEventEmitter,
    MemoryStore,
};
use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;

use crate::config::ServerConfig;

/// Airwave Server - Live/AutoDJ broadcast orchestration and WebRTC signaling relay.
#[derive(Parser, Debug)]
#[command(name = "airwave-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "AIRWAVE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "AIRWAVE_BIND_PORT")]
    port: Option<u16>,

    /// JSON catalog of tracks and playlists (overrides config file).
    #[arg(long, value_name = "FILE", env = "AIRWAVE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Data directory for the persisted status history.
    #[arg(short = 'd', long, env = "AIRWAVE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Airwave Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(catalog) = args.catalog {
        config.catalog = Some(catalog);
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    log::info!(
        "Configuration: bind_port={}, fallback_track_secs={}",
        config.bind_port,
        config.fallback_track_secs
    );

    let mut store = match config.catalog {
        Some(ref path) => {
            let catalog = Catalog::load(path)
                .with_context(|| format!("Failed to load catalog: {}", path.display()))?;
            log::info!(
                "Loaded catalog {}: {} track(s), {} playlist(s)",
                path.display(),
                catalog.tracks.len(),
                catalog.playlists.len()
            );
            MemoryStore::from_catalog(catalog)
        }
        None => {
            log::info!("No catalog configured - starting with an empty library");
            MemoryStore::new()
        }
    };

    if let Some(ref data_dir) = config.data_dir {
        log::info!("Using data directory: {}", data_dir.display());
        store = store.with_data_dir(data_dir);
    } else {
        log::info!("No data directory configured - status history will not persist");
    }

    let core_config = config.to_core_config();
    let store = store.with_retention(core_config.history_limit.max(STATUS_HISTORY_RETENTION));
    let store: Arc<dyn BroadcastStore> = Arc::new(store);
    let services =
        bootstrap_services(&core_config, store).context("Failed to bootstrap services")?;

    if args.log_level >= log::LevelFilter::Debug {
        services
            .event_bridge
            .set_external_emitter(Arc::new(LoggingEventEmitter));
    }

    log::info!("Services bootstrapped successfully");

    // Build app state for the HTTP server
    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown; cancelling the token stops the HTTP server
    services.shutdown();

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
