//! Cache storage trait and types.

use crate::error::Result;
use crate::network::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of a stored request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, url: &url::Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str(), url))
    }

    pub fn for_request(request: &FetchRequest) -> Self {
        Self::new(&request.method, &request.url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata about one named cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Cache (generation) name.
    pub name: String,
    /// Number of stored responses.
    pub entry_count: usize,
    /// Total size of stored bodies in bytes.
    pub total_size_bytes: u64,
}

/// Statistics across every named cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub caches: Vec<CacheMeta>,
}

impl CacheStats {
    pub fn from_caches(caches: Vec<CacheMeta>) -> Self {
        Self {
            total_entries: caches.iter().map(|c| c.entry_count).sum(),
            total_size_bytes: caches.iter().map(|c| c.total_size_bytes).sum(),
            caches,
        }
    }
}

/// Named response caches, the storage a cache manager owns.
///
/// Cache names are kept in creation order; `keys` and `match_any` follow it.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named cache if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Check whether a cache with this name exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Names of all caches.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a cache and every entry in it.
    ///
    /// Returns `false` if no such cache existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Look up a request in one cache.
    async fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<FetchResponse>>;

    /// Store a response, replacing any previous entry for the key.
    ///
    /// Creates the cache if needed.
    async fn put(&self, name: &str, key: &CacheKey, response: FetchResponse) -> Result<()>;

    /// Per-cache statistics.
    async fn stats(&self) -> Result<CacheStats>;

    /// Look up a request in every cache, oldest first.
    async fn match_any(&self, key: &CacheKey) -> Result<Option<FetchResponse>> {
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Shared handle to any cache storage.
pub type DynCacheStorage = Arc<dyn CacheStorage>;
