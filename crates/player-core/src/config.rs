//! Centralized configuration for the player core.
//!
//! Constant groups live as associated consts on unit structs; the runtime
//! knobs (cache generation, scope, storage prefix) are serde structs that can
//! be loaded from a JSON file and fall back to the constants.

use crate::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Application-level constants.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Rebecca Media Player";
    /// Current cache generation shipped with this build.
    pub const CACHE_NAME: &'static str = "music-player-v1";
    /// Prefix owned by the sync channel in persistent storage.
    pub const STORAGE_PREFIX: &'static str = "musicPlayer_";
    /// Upper bound on playlist length accepted by the sync channel.
    pub const MAX_SONGS: usize = 500;
    pub const DEFAULT_SCOPE: &'static str = "http://localhost:8000/";
    /// Shell assets fetched during install.
    pub const PRECACHE_ASSETS: &'static [&'static str] = &[
        "./",
        "./index.html",
        "./styles.css",
        "./script.js",
        "./manifest.json",
        "./icons/icon-192x192.png",
        "./icons/icon-512x512.png",
    ];
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Upper bound the HTTP client puts on a single request.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "Rebecca-Media-Player/1.0";
    pub const OFFLINE_BODY: &'static str = "Offline - resource unavailable";
}

/// Configuration for the offline cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Name of the current cache generation.
    pub cache_name: String,
    /// Base URL relative precache paths resolve against.
    pub scope: String,
    /// Asset paths fetched and stored during install.
    pub precache: Vec<String>,
    /// Never store audio/video responses in the cache.
    pub bypass_media: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: AppConfig::CACHE_NAME.to_string(),
            scope: AppConfig::DEFAULT_SCOPE.to_string(),
            precache: AppConfig::PRECACHE_ASSETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            bypass_media: true,
        }
    }
}

impl WorkerConfig {
    /// Parse the scope as an absolute URL.
    pub fn scope_url(&self) -> Result<Url> {
        let url = Url::parse(&self.scope).map_err(|e| PlayerError::InvalidUrl {
            url: self.scope.clone(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(PlayerError::InvalidUrl {
                url: self.scope.clone(),
                message: "scope must be a base URL".to_string(),
            });
        }
        Ok(url)
    }

    /// Resolve every precache path against the scope.
    pub fn precache_urls(&self) -> Result<Vec<Url>> {
        let scope = self.scope_url()?;
        self.precache
            .iter()
            .map(|path| {
                scope.join(path).map_err(|e| PlayerError::InvalidUrl {
                    url: path.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(PlayerError::Config {
                message: "cache_name must not be empty".to_string(),
            });
        }
        self.precache_urls()?;
        Ok(())
    }
}

/// Configuration for the cross-tab sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SyncConfig {
    /// Prefix prepended to every key the channel writes.
    pub prefix: String,
    /// Maximum number of songs a playlist record may hold.
    pub max_songs: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: AppConfig::STORAGE_PREFIX.to_string(),
            max_songs: AppConfig::MAX_SONGS,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(PlayerError::Config {
                message: "sync prefix must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub worker: WorkerConfig,
    pub sync: SyncConfig,
}

impl PlayerConfig {
    /// Load and validate a JSON configuration file.
    ///
    /// Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| PlayerError::io_with_path(e, path))?;
        let config: PlayerConfig = serde_json::from_str(&contents).map_err(|e| {
            PlayerError::Config {
                message: format!("Failed to parse {}: {}", path.display(), e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.worker.validate()?;
        self.sync.validate()
    }
}
