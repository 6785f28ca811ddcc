//! Network access for the offline cache manager.
//!
//! This module provides:
//! - Request/response snapshots shared by the cache and the network
//! - The `Fetcher` trait the cache manager resolves misses through
//! - A reqwest-backed fetcher for real origins

mod client;
mod fetcher;
mod message;

pub use client::HttpFetcher;
pub use fetcher::{DynFetcher, Fetcher};
pub use message::{FetchRequest, FetchResponse, ResponseKind};
