//! Named, versioned caches of static assets for the service-worker shell.
//!
//! Lives in the same database as the local store (shared connection) but
//! outside the versioned schema: the cache name carries its own version.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// A cached response for one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedAsset {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AssetCache {
    conn: Arc<Mutex<Connection>>,
}

impl AssetCache {
    /// Open with an existing shared connection.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> StorageResult<Self> {
        let cache = Self { conn };
        cache.ensure_tables()?;
        Ok(cache)
    }

    /// Open in-memory (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open_with_conn(Arc::new(Mutex::new(Connection::open_in_memory()?)))
    }

    fn ensure_tables(&self) -> StorageResult<()> {
        self.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS asset_cache (
                cache_name   TEXT NOT NULL,
                url          TEXT NOT NULL,
                status       INTEGER NOT NULL,
                content_type TEXT,
                body         BLOB NOT NULL,
                stored_at    INTEGER NOT NULL,
                PRIMARY KEY (cache_name, url)
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores one asset, replacing any previous entry for the URL.
    pub fn put(&self, cache_name: &str, asset: &CachedAsset) -> StorageResult<()> {
        let conn = self.lock();
        insert_asset(&conn, cache_name, asset)
    }

    /// Stores every asset or none of them.
    pub fn put_all(&self, cache_name: &str, assets: &[CachedAsset]) -> StorageResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for asset in assets {
            insert_asset(&tx, cache_name, asset)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Looks up a cached response by exact URL.
    pub fn lookup(&self, cache_name: &str, url: &str) -> StorageResult<Option<CachedAsset>> {
        let conn = self.lock();
        let row: Option<(u16, Option<String>, Vec<u8>, i64)> = conn
            .query_row(
                "SELECT status, content_type, body, stored_at FROM asset_cache \
                 WHERE cache_name = ?1 AND url = ?2",
                params![cache_name, url],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(status, content_type, body, stored_at)| {
            Ok(CachedAsset {
                url: url.to_string(),
                status,
                content_type,
                body,
                stored_at: DateTime::from_timestamp_millis(stored_at).ok_or_else(|| {
                    StorageError::Corrupt(format!("timestamp out of range: {stored_at}"))
                })?,
            })
        })
        .transpose()
    }

    /// URLs held by a cache, sorted.
    pub fn keys(&self, cache_name: &str) -> StorageResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT url FROM asset_cache WHERE cache_name = ?1 ORDER BY url")?;
        let urls = stmt
            .query_map(params![cache_name], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    /// Names of every cache with at least one entry.
    pub fn cache_names(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT cache_name FROM asset_cache ORDER BY cache_name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Deletes a whole cache. Returns the number of entries removed.
    pub fn delete_cache(&self, cache_name: &str) -> StorageResult<usize> {
        let conn = self.lock();
        Ok(conn.execute(
            "DELETE FROM asset_cache WHERE cache_name = ?1",
            params![cache_name],
        )?)
    }
}

fn insert_asset(conn: &Connection, cache_name: &str, asset: &CachedAsset) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO asset_cache (cache_name, url, status, content_type, body, stored_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            cache_name,
            asset.url,
            asset.status,
            asset.content_type,
            asset.body,
            asset.stored_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}
