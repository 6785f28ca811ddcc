//! SQLite-based cache storage.
//!
//! Every cache generation shares one database; entries are isolated by the
//! cache name column. Survives restarts, which is what makes the shell
//! available offline on the next launch.

use super::traits::{CacheKey, CacheMeta, CacheStats, CacheStorage};
use crate::error::{PlayerError, Result};
use crate::network::{FetchResponse, ResponseKind};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// SQLite-backed `CacheStorage`.
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Open (or create) the cache database at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PlayerError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| PlayerError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| PlayerError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::with_connection(conn)
    }

    /// Cache storage backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| PlayerError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Cache generations in creation order
            CREATE TABLE IF NOT EXISTS cache_names (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            -- Stored responses
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                request_key TEXT NOT NULL,
                status INTEGER NOT NULL,
                kind TEXT NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (cache_name, request_key)
            );
            "#,
        )
        .map_err(|e| PlayerError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn ensure_cache(conn: &Connection, name: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO cache_names (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| PlayerError::Database {
            message: format!("Failed to create cache {}: {}", name, e),
            source: Some(e),
        })?;
        Ok(())
    }
}

/// Header maps are stored as a JSON list of name/value pairs.
fn encode_headers(headers: &HeaderMap) -> Result<String> {
    let pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

fn decode_headers(raw: &str) -> HeaderMap {
    let pairs: Vec<(String, String)> = match serde_json::from_str(raw) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!("Discarding unreadable stored headers: {}", e);
            return HeaderMap::new();
        }
    };

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!("Skipping invalid stored header {}", name),
        }
    }
    headers
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::ensure_cache(&conn, name)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM cache_names WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM cache_names ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1",
            params![name],
        )?;
        let removed = tx.execute("DELETE FROM cache_names WHERE name = ?1", params![name])?;
        tx.commit().map_err(|e| PlayerError::Database {
            message: format!("Failed to delete cache {}: {}", name, e),
            source: Some(e),
        })?;
        Ok(removed > 0)
    }

    async fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<FetchResponse>> {
        let conn = self.lock()?;

        let row: Option<(u16, String, String, Vec<u8>)> = conn
            .query_row(
                r#"
                SELECT status, kind, headers, body
                FROM cache_entries
                WHERE cache_name = ?1 AND request_key = ?2
                "#,
                params![name, key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| PlayerError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let (status, kind, headers, body) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let status = StatusCode::from_u16(status).map_err(|e| PlayerError::Database {
            message: format!("Stored status {} for {} is invalid: {}", status, key, e),
            source: None,
        })?;
        let kind = ResponseKind::parse(&kind).ok_or_else(|| PlayerError::Database {
            message: format!("Stored response kind {} for {} is invalid", kind, key),
            source: None,
        })?;

        Ok(Some(FetchResponse {
            status,
            kind,
            headers: decode_headers(&headers),
            body: Bytes::from(body),
        }))
    }

    async fn put(&self, name: &str, key: &CacheKey, response: FetchResponse) -> Result<()> {
        let headers = encode_headers(&response.headers)?;
        let conn = self.lock()?;
        Self::ensure_cache(&conn, name)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (cache_name, request_key, status, kind, headers, body, size_bytes, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                name,
                key.as_str(),
                response.status.as_u16(),
                response.kind.as_str(),
                headers,
                response.body.as_ref(),
                response.body.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| PlayerError::Database {
            message: format!("Failed to store cache entry: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT n.name, COUNT(e.request_key), COALESCE(SUM(e.size_bytes), 0)
            FROM cache_names n
            LEFT JOIN cache_entries e ON e.cache_name = n.name
            GROUP BY n.id, n.name
            ORDER BY n.id
            "#,
        )?;
        let caches = stmt
            .query_map([], |row| {
                Ok(CacheMeta {
                    name: row.get(0)?,
                    entry_count: row.get::<_, i64>(1)? as usize,
                    total_size_bytes: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(CacheStats::from_caches(caches))
    }
}
