//! The remote backend seam.

use crate::error::RemoteResult;
use async_trait::async_trait;
use edublog_types::{Record, Table};

/// Hosted store the queue replays into.
///
/// Implementations must treat an insert of an already-present id as success:
/// a crash between a successful apply and the queue removal replays it.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn insert(&self, table: Table, record: &Record) -> RemoteResult<()>;

    /// Applies a partial or full record to the row with `id`.
    async fn update(&self, table: Table, id: &str, partial: &serde_json::Value)
        -> RemoteResult<()>;

    async fn delete_by_id(&self, table: Table, id: &str) -> RemoteResult<()>;
}
