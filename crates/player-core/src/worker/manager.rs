//! CacheManager - cache-first fetch interception with generation cleanup.
//!
//! Provides:
//! - Install-time precaching of the shell assets (partial failures tolerated)
//! - Cache-first request resolution with network fallback
//! - Offline fallback to any stored generation, then a synthetic 503
//! - Activation-time deletion of every stale generation
//!
//! Storage failures never reach the caller. They are logged and the request
//! is answered from whatever source is still available.

use crate::cache::{CacheKey, CacheStats, DynCacheStorage};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::network::{DynFetcher, FetchRequest, FetchResponse};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

/// A precache asset that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAsset {
    pub url: String,
    pub reason: String,
}

/// Outcome of an install pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    /// Assets stored in the current generation.
    pub cached: Vec<String>,
    /// Assets skipped because fetching or storing failed.
    pub failed: Vec<FailedAsset>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of an activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub current: String,
    /// Stale generations that were removed.
    pub deleted: Vec<String>,
    /// Stale generations whose deletion failed.
    pub failed: Vec<String>,
}

/// Offline cache manager for one cache generation.
pub struct CacheManager {
    config: WorkerConfig,
    caches: DynCacheStorage,
    network: DynFetcher,
}

impl CacheManager {
    /// Create a manager for the generation named in `config`.
    pub fn new(config: WorkerConfig, caches: DynCacheStorage, network: DynFetcher) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            caches,
            network,
        })
    }

    /// Name of the current cache generation.
    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Statistics for every stored generation.
    pub async fn stats(&self) -> Result<CacheStats> {
        self.caches.stats().await
    }

    // === Install ===

    /// Fetch and store every precache asset in the current generation.
    ///
    /// A failing asset is logged and reported; the others are still stored.
    pub async fn install(&self) -> InstallReport {
        let name = self.cache_name().to_string();
        let mut report = InstallReport {
            cache_name: name.clone(),
            ..InstallReport::default()
        };

        let urls = match self.config.precache_urls() {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Precache list is unusable: {}", e);
                return report;
            }
        };

        if let Err(e) = self.caches.open(&name).await {
            warn!("Cache failed: could not open {}: {}", name, e);
            report.failed = urls
                .into_iter()
                .map(|url| FailedAsset {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
                .collect();
            return report;
        }
        info!("Opened cache {}", name);

        let results = join_all(urls.into_iter().map(|url| self.precache(url))).await;
        for result in results {
            match result {
                Ok(url) => report.cached.push(url),
                Err(failed) => {
                    warn!("Failed to precache {}: {}", failed.url, failed.reason);
                    report.failed.push(failed);
                }
            }
        }

        info!(
            "Install finished for {}: {} cached, {} failed",
            name,
            report.cached.len(),
            report.failed.len()
        );
        report
    }

    async fn precache(&self, url: Url) -> std::result::Result<String, FailedAsset> {
        let request = FetchRequest::get(url);
        let failed = |reason: String| FailedAsset {
            url: request.url.to_string(),
            reason,
        };

        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status.is_success() {
            return Err(failed(format!("unexpected status {}", response.status)));
        }

        self.caches
            .put(self.cache_name(), &CacheKey::for_request(&request), response)
            .await
            .map_err(|e| failed(e.to_string()))?;

        debug!("Precached {}", request.url);
        Ok(request.url.to_string())
    }

    // === Fetch interception ===

    /// Answer a request the way the page would see it.
    ///
    /// Non-GET requests go to the network untouched, so any `Err` comes from
    /// the network itself. GET requests always resolve to a response.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if !request.is_get() {
            debug!("Passing through {} {}", request.method, request.url);
            return self.network.fetch(request).await;
        }
        Ok(self.respond(request).await)
    }

    /// Send a request straight to the network, bypassing every cache.
    pub async fn passthrough(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.network.fetch(request).await
    }

    async fn respond(&self, request: &FetchRequest) -> FetchResponse {
        if request.is_blob() {
            return match self.network.fetch(request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Blob {} could not be resolved: {}", request.url, e);
                    FetchResponse::empty()
                }
            };
        }

        let key = CacheKey::for_request(request);
        match self.caches.match_in(self.cache_name(), &key).await {
            Ok(Some(cached)) => {
                debug!("Cache hit: {}", key);
                return cached;
            }
            Ok(None) => debug!("Cache miss: {}", key),
            Err(e) => warn!("Cache lookup failed for {}: {}", key, e),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if self.should_store(request, &response) {
                    if let Err(e) = self
                        .caches
                        .put(self.cache_name(), &key, response.clone())
                        .await
                    {
                        warn!("Failed to cache {}: {}", key, e);
                    }
                }
                response
            }
            Err(e) => {
                warn!("Network fetch failed for {}: {}", request.url, e);
                self.offline_fallback(&key).await
            }
        }
    }

    fn should_store(&self, request: &FetchRequest, response: &FetchResponse) -> bool {
        response.is_cacheable() && !(self.config.bypass_media && request.is_media())
    }

    async fn offline_fallback(&self, key: &CacheKey) -> FetchResponse {
        match self.caches.match_any(key).await {
            Ok(Some(cached)) => {
                debug!("Serving {} from cache while offline", key);
                cached
            }
            Ok(None) => FetchResponse::offline(),
            Err(e) => {
                warn!("Offline cache lookup failed for {}: {}", key, e);
                FetchResponse::offline()
            }
        }
    }

    // === Activation ===

    /// Delete every cache generation except the current one.
    pub async fn activate(&self) -> ActivationReport {
        let current = self.cache_name().to_string();
        let mut report = ActivationReport {
            current: current.clone(),
            ..ActivationReport::default()
        };

        let names = match self.caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not enumerate caches: {}", e);
                return report;
            }
        };

        for name in names.into_iter().filter(|name| *name != current) {
            info!("Deleting old cache: {}", name);
            match self.caches.delete(&name).await {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!("Failed to delete cache {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStorage, MemoryCacheStorage};
    use crate::network::ResponseKind;
    use crate::testing::{BrokenCacheStorage, StubNetwork};
    use reqwest::header::{self, HeaderValue};
    use reqwest::{Method, StatusCode};
    use std::sync::Arc;

    const SCOPE: &str = "http://localhost:8000/";

    fn config(precache: &[&str]) -> WorkerConfig {
        WorkerConfig {
            cache_name: "music-player-v1".to_string(),
            scope: SCOPE.to_string(),
            precache: precache.iter().map(|s| s.to_string()).collect(),
            bypass_media: true,
        }
    }

    fn manager(
        precache: &[&str],
        caches: Arc<dyn CacheStorage>,
        network: Arc<StubNetwork>,
    ) -> CacheManager {
        CacheManager::new(config(precache), caches, network).unwrap()
    }

    fn get(url: &str) -> FetchRequest {
        FetchRequest::parse_get(url).unwrap()
    }

    #[tokio::test]
    async fn test_install_then_serve_offline() {
        let network = Arc::new(StubNetwork::new());
        network
            .serve("http://localhost:8000/", "root")
            .serve("http://localhost:8000/index.html", "<html>")
            .serve("http://localhost:8000/styles.css", "body{}");
        let caches = Arc::new(MemoryCacheStorage::new());
        let manager = manager(
            &["./", "./index.html", "./styles.css"],
            caches.clone(),
            network.clone(),
        );

        let report = manager.install().await;
        assert!(report.is_complete());
        assert_eq!(report.cached.len(), 3);
        assert_eq!(network.calls(), 3);

        network.set_offline(true);
        for url in [
            "http://localhost:8000/",
            "http://localhost:8000/index.html",
            "http://localhost:8000/styles.css",
        ] {
            let response = manager.handle_fetch(&get(url)).await.unwrap();
            assert_eq!(response.status, StatusCode::OK);
        }
        assert_eq!(network.calls(), 3);
    }

    #[tokio::test]
    async fn test_install_tolerates_failed_asset() {
        let network = Arc::new(StubNetwork::new());
        network
            .serve("http://localhost:8000/index.html", "<html>")
            .fail("http://localhost:8000/script.js");
        let caches = Arc::new(MemoryCacheStorage::new());
        let manager = manager(
            &["./index.html", "./script.js", "./missing.png"],
            caches.clone(),
            network,
        );

        let report = manager.install().await;
        assert_eq!(report.cached, vec!["http://localhost:8000/index.html"]);
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .iter()
            .any(|f| f.url == "http://localhost:8000/missing.png"
                && f.reason.contains("404")));

        let stats = caches.stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_install_reports_everything_when_cache_cannot_store() {
        let network = Arc::new(StubNetwork::new());
        network.serve("http://localhost:8000/index.html", "<html>");
        let caches = Arc::new(BrokenCacheStorage::default());
        let manager = manager(&["./index.html"], caches, network);

        let report = manager.install().await;
        assert!(report.cached.is_empty());
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_miss_fetches_once_then_hits() {
        let network = Arc::new(StubNetwork::new());
        network.serve("http://localhost:8000/videos/intro.json", "{}");
        let manager = manager(&[], Arc::new(MemoryCacheStorage::new()), network.clone());
        let request = get("http://localhost:8000/videos/intro.json");

        let first = manager.handle_fetch(&request).await.unwrap();
        assert_eq!(network.calls(), 1);
        assert_eq!(manager.stats().await.unwrap().total_entries, 1);

        let second = manager.handle_fetch(&request).await.unwrap();
        assert_eq!(network.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let network = Arc::new(StubNetwork::new());
        network.serve("http://localhost:8000/api/comments", "ok");
        let manager = manager(&[], Arc::new(MemoryCacheStorage::new()), network.clone());
        let request = FetchRequest::new(
            Method::POST,
            Url::parse("http://localhost:8000/api/comments").unwrap(),
        );

        manager.handle_fetch(&request).await.unwrap();
        manager.handle_fetch(&request).await.unwrap();
        assert_eq!(network.calls(), 2);
        assert_eq!(manager.stats().await.unwrap().total_entries, 0);

        network.set_offline(true);
        assert!(manager.handle_fetch(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_blob_is_never_cached() {
        let network = Arc::new(StubNetwork::new());
        let manager = manager(&[], Arc::new(MemoryCacheStorage::new()), network.clone());
        let request = get("blob:http://localhost:8000/5f2d8c1e-9a4b-4c3d");

        let response = manager.handle_fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.is_empty());
        assert_eq!(manager.stats().await.unwrap().total_entries, 0);
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_without_cache_is_service_unavailable() {
        let network = Arc::new(StubNetwork::new());
        network.set_offline(true);
        let manager = manager(&[], Arc::new(MemoryCacheStorage::new()), network);

        let response = manager
            .handle_fetch(&get("http://localhost:8000/never-seen.js"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_older_generation() {
        let network = Arc::new(StubNetwork::new());
        network.set_offline(true);
        let caches = Arc::new(MemoryCacheStorage::new());
        let request = get("http://localhost:8000/index.html");
        caches
            .put(
                "music-player-v0",
                &CacheKey::for_request(&request),
                FetchResponse::new(StatusCode::OK, ResponseKind::Basic, "old shell"),
            )
            .await
            .unwrap();
        let manager = manager(&[], caches, network);

        let response = manager.handle_fetch(&request).await.unwrap();
        assert_eq!(response.body, "old shell");
    }

    #[tokio::test]
    async fn test_uncacheable_responses_are_returned_not_stored() {
        let network = Arc::new(StubNetwork::new());
        network.respond(
            "https://cdn.example.com/font.woff2",
            FetchResponse::new(StatusCode::OK, ResponseKind::Opaque, ""),
        );
        let manager = manager(&[], Arc::new(MemoryCacheStorage::new()), network.clone());

        let missing = manager
            .handle_fetch(&get("http://localhost:8000/nope.html"))
            .await
            .unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let opaque = manager
            .handle_fetch(&get("https://cdn.example.com/font.woff2"))
            .await
            .unwrap();
        assert_eq!(opaque.kind, ResponseKind::Opaque);
        assert_eq!(manager.stats().await.unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_media_requests_are_not_stored() {
        let network = Arc::new(StubNetwork::new());
        network
            .serve("http://localhost:8000/audio/track.mp3", "ID3")
            .serve("http://localhost:8000/stream", "OggS");
        let manager = manager(&[], Arc::new(MemoryCacheStorage::new()), network.clone());

        manager
            .handle_fetch(&get("http://localhost:8000/audio/track.mp3"))
            .await
            .unwrap();
        let request = get("http://localhost:8000/stream")
            .with_header(header::ACCEPT, HeaderValue::from_static("audio/*"));
        manager.handle_fetch(&request).await.unwrap();

        assert_eq!(manager.stats().await.unwrap().total_entries, 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_response() {
        let network = Arc::new(StubNetwork::new());
        network.serve("http://localhost:8000/manifest.json", "{}");
        let caches = Arc::new(BrokenCacheStorage::failing_reads());
        let manager = manager(&[], caches.clone(), network);

        let response = manager
            .handle_fetch(&get("http://localhost:8000/manifest.json"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(caches.puts(), 1);
    }

    #[tokio::test]
    async fn test_activate_keeps_only_current_generation() {
        let network = Arc::new(StubNetwork::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        let request = get("http://localhost:8000/index.html");
        let key = CacheKey::for_request(&request);
        let old = FetchResponse::new(StatusCode::OK, ResponseKind::Basic, "old");
        caches.put("music-player-v0", &key, old).await.unwrap();
        caches.open("scratch").await.unwrap();
        caches.open("music-player-v1").await.unwrap();
        let manager = manager(&[], caches.clone(), network.clone());

        let report = manager.activate().await;
        assert_eq!(report.deleted, vec!["music-player-v0", "scratch"]);
        assert!(report.failed.is_empty());
        assert_eq!(caches.keys().await.unwrap(), vec!["music-player-v1"]);

        network.set_offline(true);
        let response = manager.handle_fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_activate_logs_delete_failures() {
        let caches = Arc::new(BrokenCacheStorage::default());
        caches.open("music-player-v0").await.unwrap();
        let manager = manager(&[], caches, Arc::new(StubNetwork::new()));

        let report = manager.activate().await;
        assert!(report.deleted.is_empty());
        assert_eq!(report.failed, vec!["music-player-v0"]);
    }
}
