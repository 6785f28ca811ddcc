//! Request and response snapshots exchanged between the page, the cache
//! manager and the network.

use crate::config::NetworkConfig;
use crate::error::{PlayerError, Result};
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// How a response may be read by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    /// Cross-origin response the page is allowed to read.
    Cors,
    /// Cross-origin response with hidden status and body.
    Opaque,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Basic => "basic",
            ResponseKind::Cors => "cors",
            ResponseKind::Opaque => "opaque",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(ResponseKind::Basic),
            "cors" => Some(ResponseKind::Cors),
            "opaque" => Some(ResponseKind::Opaque),
            _ => None,
        }
    }

    /// Whether the page can read this response.
    pub fn is_transparent(&self) -> bool {
        matches!(self, ResponseKind::Basic | ResponseKind::Cors)
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request as seen by the fetch interceptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Request payload; empty for GET.
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and build a GET request for it.
    pub fn parse_get(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| PlayerError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::get(parsed))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether the URL points at a locally generated in-memory object.
    pub fn is_blob(&self) -> bool {
        self.url.scheme() == "blob"
    }

    /// Whether the request targets streamed audio or video.
    pub fn is_media(&self) -> bool {
        if self.url.as_str().contains("audio/") {
            return true;
        }
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|accept| accept.contains("audio/") || accept.contains("video/"))
    }
}

/// A response snapshot. Cloning is cheap: the body is reference counted.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub kind: ResponseKind,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, kind: ResponseKind, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            kind,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Empty 200 used in place of an unresolvable blob reference.
    pub fn empty() -> Self {
        Self::new(StatusCode::OK, ResponseKind::Basic, Bytes::new())
    }

    /// Synthetic response returned when neither network nor cache can answer.
    pub fn offline() -> Self {
        let mut response = Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ResponseKind::Basic,
            NetworkConfig::OFFLINE_BODY,
        );
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Only complete, readable responses may be stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && self.kind.is_transparent()
    }
}
