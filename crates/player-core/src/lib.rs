//! Player Core - offline caching and cross-tab sync for the media player.
//!
//! Two independent components:
//!
//! - [`worker`]: a cache manager with a worker lifecycle that precaches the
//!   app shell, answers GET requests cache-first, and falls back to cached
//!   or synthetic offline responses when the network is gone.
//! - [`sync`]: a prefixed key/value channel over persistent storage that
//!   notifies local subscribers on write and other tabs via storage events.
//!
//! # Example
//!
//! ```rust,ignore
//! use player_core::{CacheManager, HttpFetcher, ServiceWorker, SqliteCacheStorage, WorkerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> player_core::Result<()> {
//!     let config = WorkerConfig::default();
//!     let caches = Arc::new(SqliteCacheStorage::new("/tmp/player/cache.db")?);
//!     let network = Arc::new(HttpFetcher::new(&config.scope_url()?)?);
//!
//!     let worker = ServiceWorker::new(CacheManager::new(config, caches, network)?);
//!     worker.install().await?;
//!     worker.activate().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use cache::{CacheKey, CacheStats, CacheStorage, MemoryCacheStorage, SqliteCacheStorage};
pub use config::{AppConfig, NetworkConfig, PlayerConfig, SyncConfig, WorkerConfig};
pub use error::{PlayerError, Result};
pub use network::{FetchRequest, FetchResponse, Fetcher, HttpFetcher, ResponseKind};
pub use sync::{
    AudioMode, MemoryStorage, RecordKind, SqliteStorage, StorageArea, StorageHub, SyncChannel,
    SyncRecord,
};
pub use worker::{CacheManager, ServiceWorker, WorkerMessage, WorkerState};
