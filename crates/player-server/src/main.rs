//! Player Server - serves the media player through its offline worker.
//!
//! Every request the page makes is resolved by the worker: cache first, the
//! origin on a miss, a cached copy or an offline response when the origin is
//! unreachable. Player state (playlist, comments, audio mode) is exposed
//! under `/sync/{key}`.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use player_core::{
    AppConfig, CacheManager, HttpFetcher, PlayerConfig, ServiceWorker, SqliteCacheStorage,
    SqliteStorage, SyncChannel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "player-server")]
#[command(about = "Offline-first HTTP front for the media player")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Origin serving the player's files (overrides the config file)
    #[arg(long)]
    origin: Option<String>,

    /// Directory for the cache and storage databases
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("rebecca-player"))
        .unwrap_or_else(|| PathBuf::from("player-data"))
}

/// Wire the worker and sync channel over SQLite files in `data_dir`.
async fn build_state(config: PlayerConfig, data_dir: &Path) -> Result<server::AppState> {
    let origin = config.worker.scope_url()?;

    let caches = Arc::new(
        SqliteCacheStorage::new(data_dir.join("cache.db")).context("opening cache storage")?,
    );
    let network = Arc::new(HttpFetcher::new(&origin)?);
    let worker = Arc::new(ServiceWorker::new(CacheManager::new(
        config.worker,
        caches,
        network,
    )?));

    let report = worker.install().await?;
    for failed in &report.failed {
        warn!("Not available offline: {} ({})", failed.url, failed.reason);
    }
    worker.activate().await?;

    let storage =
        Arc::new(SqliteStorage::new(data_dir.join("storage.db")).context("opening sync storage")?);
    let sync = Arc::new(SyncChannel::new(config.sync, storage)?);

    Ok(server::AppState {
        worker,
        sync,
        origin,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting {}", AppConfig::APP_NAME);

    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    if let Some(origin) = args.origin {
        config.worker.scope = origin;
    }
    config.validate()?;

    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    info!("Data directory: {}", data_dir.display());

    let state = build_state(config, &data_dir).await?;
    let addr = server::start_server(state, &args.host, args.port).await?;

    // Print port for launchers to read
    println!("PLAYER_PORT={}", addr.port());

    info!("Player server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
