//! Cross-tab state sync over prefixed persistent storage.

mod channel;
mod hub;
mod records;
mod storage;

pub use channel::{ChangeCallback, SubscriptionId, SyncChannel};
pub use hub::{StorageEvent, StorageEvents, StorageHub, TabId, TabStorage};
pub use records::{song_id, AudioMode, Comment, Comments, RecordKind, Song, SyncRecord};
pub use storage::{DynStorageArea, MemoryStorage, SqliteStorage, StorageArea};
