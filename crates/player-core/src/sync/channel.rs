//! Prefixed key/value channel with change subscriptions.
//!
//! Local writes notify this channel's subscribers synchronously. Writes by
//! other tabs arrive as `StorageEvent`s and are delivered to the subscribers
//! of the matching key. The writing tab never receives its own event, so a
//! local refresh always goes through `set`.

use super::hub::{StorageEvent, StorageEvents, TabId, TabStorage};
use super::records::{RecordKind, SyncRecord};
use super::storage::DynStorageArea;
use crate::config::SyncConfig;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle returned by `on_change`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback. `None` means the key was removed or unreadable.
pub type ChangeCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

type Subscribers = HashMap<String, Vec<(SubscriptionId, ChangeCallback)>>;

pub struct SyncChannel {
    config: SyncConfig,
    storage: DynStorageArea,
    /// Tab this channel writes as, when attached to a hub.
    tab: Option<TabId>,
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
}

impl SyncChannel {
    /// Channel over any storage area.
    pub fn new(config: SyncConfig, storage: DynStorageArea) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            tab: None,
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Channel for one tab of a `StorageHub`.
    pub fn for_tab(config: SyncConfig, tab: Arc<TabStorage>) -> Result<Self> {
        let id = tab.id();
        let mut channel = Self::new(config, tab)?;
        channel.tab = Some(id);
        Ok(channel)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // Callbacks never run under the lock, so a poisoned list is still consistent.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key` and notify local subscribers.
    ///
    /// A serialization or storage failure is logged and nothing changes.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value) {
            warn!("Failed to save {} to storage: {}", key, e);
        }
    }

    /// Like `set`, but reports the failure. Subscribers only hear about
    /// writes that reached storage.
    pub fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.storage
            .set_item(&self.storage_key(key), &value.to_string())?;
        self.notify(key, present(&value));
        Ok(())
    }

    /// Read and deserialize `key`. Absent or malformed data yields `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!("Stored value for {} has the wrong shape: {}", key, e);
                None
            }
        }
    }

    /// Read `key` as raw JSON.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let raw = match self.storage.get_item(&self.storage_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read {} from storage: {}", key, e);
                return None;
            }
        };
        parse_stored(key, &raw)
    }

    /// Delete `key` and notify local subscribers with `None`.
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(&self.storage_key(key)) {
            warn!("Failed to remove {} from storage: {}", key, e);
            return;
        }
        self.notify(key, None);
    }

    /// Unprefixed keys currently stored by this channel.
    pub fn keys(&self) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => keys
                .iter()
                .filter_map(|k| k.strip_prefix(&self.config.prefix))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!("Failed to list storage keys: {}", e);
                Vec::new()
            }
        }
    }

    /// Subscribe to changes of `key`. Callbacks run in registration order.
    pub fn on_change<F>(&self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Unsubscribe. Returns whether the subscription existed.
    pub fn off_change(&self, key: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let Some(list) = subscribers.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(key);
        }
        removed
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }

    fn notify(&self, key: &str, value: Option<&Value>) {
        let callbacks: Vec<ChangeCallback> = match self.lock().get(key) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(value);
        }
    }

    /// Deliver a change made by another tab.
    pub fn handle_storage_event(&self, event: &StorageEvent) {
        if self.tab == Some(event.source) {
            return;
        }
        let Some(full_key) = event.key.as_deref() else {
            return;
        };
        let Some(key) = full_key.strip_prefix(&self.config.prefix) else {
            return;
        };

        let value = event
            .new_value
            .as_deref()
            .and_then(|raw| parse_stored(key, raw));
        debug!("Remote change to {}", key);
        self.notify(key, value.as_ref());
    }

    /// Feed another tab's changes into this channel.
    ///
    /// The task ends when the hub goes away or the channel is dropped.
    pub fn listen(self: &Arc<Self>, mut events: StorageEvents) -> JoinHandle<()> {
        let channel = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(channel) = channel.upgrade() else {
                    break;
                };
                channel.handle_storage_event(&event);
            }
            debug!("Storage event listener stopped");
        })
    }

    /// Validate and store a typed record.
    pub fn set_record(&self, record: &SyncRecord) -> Result<()> {
        record.validate(self.config.max_songs)?;
        let value = record.to_value()?;
        self.try_set(record.key(), &value)
    }

    /// Read a typed record. Invalid stored data yields `None`.
    pub fn get_record(&self, kind: RecordKind) -> Option<SyncRecord> {
        let value = self.get_value(kind.key())?;
        match SyncRecord::decode(kind, value, self.config.max_songs) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring invalid stored {}: {}", kind.key(), e);
                None
            }
        }
    }

    /// Subscribe to a typed record. Values that fail validation are dropped.
    pub fn on_record<F>(&self, kind: RecordKind, callback: F) -> SubscriptionId
    where
        F: Fn(Option<SyncRecord>) + Send + Sync + 'static,
    {
        let max_songs = self.config.max_songs;
        self.on_change(kind.key(), move |value| match value {
            None => callback(None),
            Some(value) => match SyncRecord::decode(kind, value.clone(), max_songs) {
                Ok(record) => callback(Some(record)),
                Err(e) => warn!("Dropping invalid {} update: {}", kind.key(), e),
            },
        })
    }
}

/// A stored `null` counts as absent.
fn present(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

fn parse_stored(key: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Malformed value stored for {}: {}", key, e);
            None
        }
    }
}
