//! Worker lifecycle around a `CacheManager`.
//!
//! A worker is parsed, installs its precache, waits, then activates and
//! starts answering fetches. Until it is activated it does not control the
//! page, so requests go straight to the network.

use super::manager::{ActivationReport, CacheManager, InstallReport};
use crate::error::{PlayerError, Result};
use crate::network::{FetchRequest, FetchResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, info};

/// Tag the page registers for replaying work once connectivity returns.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, not yet installed.
    Parsed = 0,
    Installing = 1,
    /// Installed and waiting to take control.
    Installed = 2,
    Activating = 3,
    /// Controlling the page and answering fetches.
    Activated = 4,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
        }
    }
}

/// Atomic wrapper for WorkerState.
struct AtomicWorkerState(AtomicU8);

impl AtomicWorkerState {
    fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn decode(value: u8) -> WorkerState {
        match value {
            0 => WorkerState::Parsed,
            1 => WorkerState::Installing,
            2 => WorkerState::Installed,
            3 => WorkerState::Activating,
            _ => WorkerState::Activated,
        }
    }

    fn load(&self) -> WorkerState {
        Self::decode(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to`, failing if another transition got there first.
    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| PlayerError::Lifecycle {
                from: Self::decode(actual).to_string(),
                to: to.to_string(),
            })
    }
}

/// Messages the page can post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate the waiting worker without waiting for old pages to close.
    SkipWaiting,
}

impl WorkerMessage {
    /// Parse a posted message. Unknown shapes yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// A cache manager with an install/activate lifecycle.
pub struct ServiceWorker {
    manager: CacheManager,
    state: AtomicWorkerState,
    skip_waiting: AtomicBool,
}

impl ServiceWorker {
    pub fn new(manager: CacheManager) -> Self {
        Self {
            manager,
            state: AtomicWorkerState::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    /// Whether fetches are answered by the cache manager.
    pub fn is_controlling(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    /// Run the install phase.
    ///
    /// Installation succeeds even when some assets failed to cache. If
    /// `SKIP_WAITING` was posted earlier, activation follows immediately.
    pub async fn install(&self) -> Result<InstallReport> {
        self.state
            .transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!("Installing worker for {}", self.manager.cache_name());

        let report = self.manager.install().await;
        self.state.store(WorkerState::Installed);

        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate_if_waiting().await;
        }
        Ok(report)
    }

    /// Run the activation phase, purging stale cache generations.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.state
            .transition(WorkerState::Installed, WorkerState::Activating)?;

        let report = self.manager.activate().await;
        self.state.store(WorkerState::Activated);
        info!(
            "Worker activated for {} ({} stale caches removed)",
            report.current,
            report.deleted.len()
        );
        Ok(report)
    }

    async fn activate_if_waiting(&self) -> Option<ActivationReport> {
        match self.activate().await {
            Ok(report) => Some(report),
            Err(e) => {
                debug!("Skip waiting had nothing to activate: {}", e);
                None
            }
        }
    }

    /// Handle a message posted by the page.
    ///
    /// Returns the activation report when the message activated the worker.
    pub async fn handle_message(&self, message: WorkerMessage) -> Option<ActivationReport> {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                if self.state() == WorkerState::Installed {
                    return self.activate_if_waiting().await;
                }
                debug!("Skip waiting recorded in state {}", self.state());
                None
            }
        }
    }

    /// Handle a background sync event. Returns whether the tag was recognized.
    pub fn handle_sync(&self, tag: &str) -> bool {
        if tag == BACKGROUND_SYNC_TAG {
            info!("Background sync triggered");
            true
        } else {
            debug!("Ignoring sync event with tag {}", tag);
            false
        }
    }

    /// Resolve a request from the page.
    ///
    /// Before activation the worker does not control the page and the
    /// request goes straight to the network.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if self.is_controlling() {
            self.manager.handle_fetch(request).await
        } else {
            self.manager.passthrough(request).await
        }
    }
}
