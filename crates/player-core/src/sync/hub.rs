//! Storage shared between tabs, with change events.
//!
//! Every tab connected to a `StorageHub` reads and writes the same backend.
//! Each write is announced to the other tabs as a `StorageEvent`; the tab
//! that made the write never sees its own event.

use super::storage::{DynStorageArea, StorageArea};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one tab (one browsing context) of the player.
pub type TabId = Uuid;

/// Capacity of the event channel before slow tabs start lagging.
const EVENT_BUFFER: usize = 256;

/// A change made by some tab to shared storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Full storage key, or `None` when the whole area was cleared.
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Tab that made the change.
    pub source: TabId,
}

/// One storage backend shared by all tabs of an origin.
pub struct StorageHub {
    backend: DynStorageArea,
    events: broadcast::Sender<StorageEvent>,
}

impl StorageHub {
    pub fn new(backend: DynStorageArea) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self { backend, events })
    }

    /// Open a new tab on this hub.
    pub fn connect_tab(self: &Arc<Self>) -> Arc<TabStorage> {
        let tab = TabStorage {
            id: Uuid::new_v4(),
            hub: Arc::clone(self),
        };
        debug!("Tab {} connected to storage", tab.id);
        Arc::new(tab)
    }

    fn announce(&self, event: StorageEvent) {
        // No receivers just means no other tab is listening.
        let _ = self.events.send(event);
    }
}

/// One tab's view of shared storage.
pub struct TabStorage {
    id: TabId,
    hub: Arc<StorageHub>,
}

impl TabStorage {
    pub fn id(&self) -> TabId {
        self.id
    }

    /// Subscribe to changes made by other tabs from now on.
    pub fn events(&self) -> StorageEvents {
        StorageEvents {
            tab: self.id,
            rx: self.hub.events.subscribe(),
        }
    }

    fn announce(&self, key: Option<&str>, old_value: Option<String>, new_value: Option<String>) {
        self.hub.announce(StorageEvent {
            key: key.map(str::to_string),
            old_value,
            new_value,
            source: self.id,
        });
    }
}

impl StorageArea for TabStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.hub.backend.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let old_value = self.hub.backend.get_item(key).ok().flatten();
        self.hub.backend.set_item(key, value)?;

        if old_value.as_deref() != Some(value) {
            self.announce(Some(key), old_value, Some(value.to_string()));
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let old_value = self.hub.backend.get_item(key).ok().flatten();
        self.hub.backend.remove_item(key)?;

        if old_value.is_some() {
            self.announce(Some(key), old_value, None);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.hub.backend.keys()
    }

    fn clear(&self) -> Result<()> {
        let had_items = !self.hub.backend.keys()?.is_empty();
        self.hub.backend.clear()?;

        if had_items {
            self.announce(None, None, None);
        }
        Ok(())
    }
}

/// Stream of storage events written by tabs other than the subscriber.
pub struct StorageEvents {
    tab: TabId,
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageEvents {
    /// Wait for the next event from another tab.
    ///
    /// Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Tab {} missed {} storage events", self.tab, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next already-delivered event from another tab, if any.
    pub fn try_recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.source == self.tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Tab {} missed {} storage events", self.tab, skipped);
                }
                Err(_) => return None,
            }
        }
    }
}
