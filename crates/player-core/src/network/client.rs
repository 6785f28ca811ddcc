//! HTTP-backed `Fetcher`.
//!
//! Wraps reqwest with:
//! - Configurable timeout and user agent
//! - Response classification (same-origin vs cross-origin) against the
//!   worker scope
//! - Rejection of schemes the network cannot resolve (`blob:`, `data:`)

use super::fetcher::Fetcher;
use super::message::{FetchRequest, FetchResponse, ResponseKind};
use crate::config::NetworkConfig;
use crate::error::{PlayerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::{Origin, Url};

/// Network access through a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
    /// Origin responses are compared against to decide `Basic` vs `Cors`.
    origin: Origin,
    /// Default timeout for requests.
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher for pages served from `scope`.
    pub fn new(scope: &Url) -> Result<Self> {
        Self::with_timeout(scope, NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(scope: &Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| PlayerError::Network {
                message: "Failed to create HTTP client".to_string(),
                cause: Some(e.to_string()),
            })?;

        Ok(Self {
            client,
            origin: scope.origin(),
            timeout,
        })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Classify a response by comparing the request URL with the page origin.
    pub fn classify(&self, url: &Url) -> ResponseKind {
        if url.origin() == self.origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(PlayerError::network(format!(
                    "{} URLs cannot be fetched over the network: {}",
                    other, request.url
                )));
            }
        }

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| PlayerError::Network {
                message: format!("{} {} failed", request.method, request.url),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let kind = self.classify(response.url());
        let body = response.bytes().await?;

        debug!(
            "{} {} -> {} ({}, {} bytes)",
            request.method,
            request.url,
            status,
            kind,
            body.len()
        );

        Ok(FetchResponse {
            status,
            kind,
            headers,
            body,
        })
    }
}
