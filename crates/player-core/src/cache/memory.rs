//! In-memory cache storage.

use super::traits::{CacheKey, CacheMeta, CacheStats, CacheStorage};
use crate::error::Result;
use crate::network::FetchResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct NamedCache {
    name: String,
    entries: HashMap<CacheKey, FetchResponse>,
}

/// Cache storage that lives for the lifetime of the process.
#[derive(Default)]
pub struct MemoryCacheStorage {
    /// Caches in creation order.
    caches: RwLock<Vec<NamedCache>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|c| c.name == name) {
            caches.push(NamedCache {
                name: name.to_string(),
                entries: HashMap::new(),
            });
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<FetchResponse>> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.entries.get(key).cloned()))
    }

    async fn put(&self, name: &str, key: &CacheKey, response: FetchResponse) -> Result<()> {
        let mut caches = self.caches.write().await;
        match caches.iter_mut().find(|c| c.name == name) {
            Some(cache) => {
                cache.entries.insert(key.clone(), response);
            }
            None => {
                let mut entries = HashMap::new();
                entries.insert(key.clone(), response);
                caches.push(NamedCache {
                    name: name.to_string(),
                    entries,
                });
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let caches = self.caches.read().await;
        Ok(CacheStats::from_caches(
            caches
                .iter()
                .map(|c| CacheMeta {
                    name: c.name.clone(),
                    entry_count: c.entries.len(),
                    total_size_bytes: c.entries.values().map(|r| r.body.len() as u64).sum(),
                })
                .collect(),
        ))
    }
}
