//! Named response caches for offline operation.
//!
//! Each cache is one generation (for example `music-player-v1`). Two backends
//! are provided:
//! - `MemoryCacheStorage` for tests and ephemeral hosts
//! - `SqliteCacheStorage` for caches that must survive restarts

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCacheStorage;
pub use sqlite::SqliteCacheStorage;
pub use traits::{CacheKey, CacheMeta, CacheStats, CacheStorage, DynCacheStorage};
