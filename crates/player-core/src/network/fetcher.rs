//! The network seam used by the cache manager.

use super::message::{FetchRequest, FetchResponse};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves a request against the live network.
///
/// An `Err` means the network could not produce any response at all
/// (offline, DNS failure, refused connection). HTTP error statuses are
/// ordinary `Ok` responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Shared handle to any fetcher.
pub type DynFetcher = Arc<dyn Fetcher>;

