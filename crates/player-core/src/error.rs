//! Error types for the player core.
//!
//! Most cache and storage failures are absorbed at the component boundary and
//! only logged. These variants describe what went wrong underneath so the
//! log lines (and the few operations that do return errors) stay meaningful.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the player core.
#[derive(Debug, Error)]
pub enum PlayerError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Record validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Worker lifecycle errors
    #[error("Invalid worker transition from {from} to {to}")]
    Lifecycle { from: String, to: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for player core operations.
pub type Result<T> = std::result::Result<T, PlayerError>;

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        PlayerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PlayerError {
    fn from(err: rusqlite::Error) -> Self {
        PlayerError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for PlayerError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string());
        PlayerError::Network {
            message: match url {
                Some(url) => format!("request to {} failed", url),
                None => "request failed".to_string(),
            },
            cause: Some(err.to_string()),
        }
    }
}

impl From<url::ParseError> for PlayerError {
    fn from(err: url::ParseError) -> Self {
        PlayerError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl PlayerError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PlayerError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a network failure without an underlying cause.
    pub fn network(message: impl Into<String>) -> Self {
        PlayerError::Network {
            message: message.into(),
            cause: None,
        }
    }

    /// Shorthand for a record validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PlayerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the failure came from the network rather than local storage.
    pub fn is_network(&self) -> bool {
        matches!(self, PlayerError::Network { .. } | PlayerError::InvalidUrl { .. })
    }

    /// Whether the failure came from a storage layer (cache or key/value).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            PlayerError::Database { .. }
                | PlayerError::StorageUnavailable { .. }
                | PlayerError::Io { .. }
        )
    }
}
