//! Local store error types.

use thiserror::Error;

/// Result type for local store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the local store. Any of these means the write was not
/// durably recorded.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema setup to version {version} failed: {source}")]
    Setup {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store is at version {stored}, newer than supported version {supported}")]
    VersionDowngrade { stored: u32, supported: u32 },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid value: {0}")]
    Types(#[from] edublog_types::TypesError),

    #[error("storage task failed: {0}")]
    Task(String),
}
