//! Fakes shared by unit tests.

use crate::cache::{CacheKey, CacheStats, CacheStorage, MemoryCacheStorage};
use crate::error::{PlayerError, Result};
use crate::network::{FetchRequest, FetchResponse, Fetcher, ResponseKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Network fake serving canned responses and counting calls.
#[derive(Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, FetchResponse>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `url`.
    pub fn serve(&self, url: &str, body: &'static str) -> &Self {
        self.respond(url, FetchResponse::new(StatusCode::OK, ResponseKind::Basic, body))
    }

    pub fn respond(&self, url: &str, response: FetchResponse) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    /// Make requests for `url` fail at the network level.
    pub fn fail(&self, url: &str) -> &Self {
        self.failing.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url.as_str();
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(url) {
            return Err(PlayerError::network(format!("unreachable: {}", url)));
        }
        if request.is_blob() {
            return Err(PlayerError::network("blob revoked"));
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchResponse::new(StatusCode::NOT_FOUND, ResponseKind::Basic, "")))
    }
}

/// Cache storage whose writes (and optionally reads) always fail.
#[derive(Default)]
pub struct BrokenCacheStorage {
    inner: MemoryCacheStorage,
    fail_reads: bool,
    puts: AtomicUsize,
}

impl BrokenCacheStorage {
    /// Lookups fail too, not only writes.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

fn quota() -> PlayerError {
    PlayerError::StorageUnavailable {
        message: "quota exceeded".to_string(),
    }
}

#[async_trait]
impl CacheStorage for BrokenCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, _name: &str) -> Result<bool> {
        Err(quota())
    }

    async fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<FetchResponse>> {
        if self.fail_reads {
            return Err(quota());
        }
        self.inner.match_in(name, key).await
    }

    async fn put(&self, _name: &str, _key: &CacheKey, _response: FetchResponse) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(quota())
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.inner.stats().await
    }
}
