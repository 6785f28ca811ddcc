//! Offline worker: cache-first fetch interception and its lifecycle.

mod lifecycle;
mod manager;

pub use lifecycle::{ServiceWorker, WorkerMessage, WorkerState, BACKGROUND_SYNC_TAG};
pub use manager::{ActivationReport, CacheManager, FailedAsset, InstallReport};
