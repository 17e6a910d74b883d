//! Versioned schema setup.
//!
//! The stored version lives in `PRAGMA user_version`. Each step runs in its
//! own transaction together with the version bump, so a failed step leaves
//! the previous version fully intact and is retried on the next open.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use tracing::info;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Step `n` (1-based) upgrades a store from version `n - 1` to `n`.
const STEPS: [&str; CURRENT_VERSION as usize] = [
    // v1: entity tables, secondary indexes, pending-operation queue
    r#"
    CREATE TABLE posts (
        id          TEXT PRIMARY KEY NOT NULL,
        data        TEXT NOT NULL,
        category_id TEXT,
        author_id   TEXT,
        updated_at  INTEGER NOT NULL
    );
    CREATE INDEX idx_posts_category ON posts(category_id);
    CREATE INDEX idx_posts_author ON posts(author_id);

    CREATE TABLE categories (
        id         TEXT PRIMARY KEY NOT NULL,
        data       TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE sync_queue (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name  TEXT NOT NULL,
        op          TEXT NOT NULL,
        record_id   TEXT NOT NULL,
        payload     TEXT NOT NULL,
        enqueued_at INTEGER NOT NULL
    );
    "#,
    // v2: retry bookkeeping and dead letters
    r#"
    ALTER TABLE sync_queue ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE sync_queue ADD COLUMN last_error TEXT;

    CREATE TABLE dead_letters (
        seq         INTEGER PRIMARY KEY NOT NULL,
        table_name  TEXT NOT NULL,
        op          TEXT NOT NULL,
        record_id   TEXT NOT NULL,
        payload     TEXT NOT NULL,
        enqueued_at INTEGER NOT NULL,
        attempts    INTEGER NOT NULL,
        error       TEXT NOT NULL,
        dead_at     INTEGER NOT NULL
    );
    "#,
];

/// Reads the stored schema version (0 for a fresh database).
pub(crate) fn stored_version(conn: &Connection) -> StorageResult<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Brings the store up to [`CURRENT_VERSION`], running only the missing steps.
///
/// Stores are only ever opened at the current version; the queue API
/// depends on every step having run.
pub(crate) fn upgrade(conn: &mut Connection) -> StorageResult<()> {
    let stored = stored_version(conn)?;
    if stored > CURRENT_VERSION {
        return Err(StorageError::VersionDowngrade {
            stored,
            supported: CURRENT_VERSION,
        });
    }

    for version in (stored + 1)..=CURRENT_VERSION {
        run_step(conn, version).map_err(|source| StorageError::Setup { version, source })?;
        info!("local store upgraded to schema version {version}");
    }
    Ok(())
}

fn run_step(conn: &mut Connection, version: u32) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(STEPS[(version - 1) as usize])?;
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()
}
