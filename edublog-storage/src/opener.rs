//! Lazily opened, shared store handle.
//!
//! Every caller of [`StoreOpener::open`] gets the same [`LocalStore`]; the
//! first call performs the open and schema setup, concurrent callers wait on
//! it. A failed open is not cached and the next call tries again.

use crate::StoreOptions;
use crate::error::{StorageError, StorageResult};
use crate::local_store::LocalStore;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::info;

pub struct StoreOpener {
    path: Option<PathBuf>,
    store: OnceCell<LocalStore>,
}

impl StoreOpener {
    /// Opener for a database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            store: OnceCell::new(),
        }
    }

    /// Opener for the store named by `options` inside `dir`.
    pub fn from_options(dir: &Path, options: &StoreOptions) -> Self {
        Self::new(options.path_in(dir))
    }

    /// Opener for an in-memory database (for testing).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            store: OnceCell::new(),
        }
    }

    /// Database file this opener targets, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the shared store, opening it on first use.
    pub async fn open(&self) -> StorageResult<LocalStore> {
        let store = self
            .store
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let store = tokio::task::spawn_blocking(move || match path {
                    Some(path) => LocalStore::open(&path),
                    None => LocalStore::open_in_memory(),
                })
                .await
                .map_err(|e| StorageError::Task(e.to_string()))??;
                info!("local store opened at schema version {}", store.version());
                Ok::<_, StorageError>(store)
            })
            .await?;
        Ok(store.clone())
    }

    /// The store, if it has already been opened.
    pub fn get(&self) -> Option<LocalStore> {
        self.store.get().cloned()
    }
}
