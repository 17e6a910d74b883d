//! SQLite storage layer for the EduBlog offline sync core.
//!
//! One named, versioned database file per device holds:
//!
//! - `posts` and `categories`: the entity tables, records stored as JSON
//! - `sync_queue`: pending operations keyed by an auto-increment sequence id
//! - `dead_letters`: operations parked after permanent remote failures
//! - `asset_cache`: static assets cached by the service-worker shell
//!
//! Schema setup runs once per version bump, each step in its own transaction.

mod asset_cache;
mod error;
mod local_store;
mod opener;
mod schema;

pub use asset_cache::{AssetCache, CachedAsset};
pub use error::{StorageError, StorageResult};
pub use local_store::LocalStore;
pub use opener::StoreOpener;
pub use schema::CURRENT_VERSION;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the durable store lives inside an app data directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Store namespace; also the database file stem.
    pub name: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: "edublog".to_string(),
        }
    }
}

impl StoreOptions {
    /// Database file path inside `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.sqlite3", self.name))
    }
}

/// Open a SQLite connection with WAL journaling and a busy timeout.
///
/// In-memory databases report `memory` as their journal mode; that is fine.
pub fn open_sqlite(path: &Path) -> StorageResult<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    apply_connection_settings(&conn)?;
    Ok(conn)
}

fn apply_connection_settings(conn: &rusqlite::Connection) -> StorageResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!("sqlite journal mode: {mode}");
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}
