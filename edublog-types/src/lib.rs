//! Core types for the EduBlog offline sync core.
//!
//! - [`Record`]: opaque JSON payload keyed by a string id
//! - [`Post`] / [`Category`]: typed views that convert to and from records
//! - [`Mutation`] / [`PendingOperation`]: queued local writes awaiting replay

mod blog;
mod operation;
mod record;

pub use blog::{Category, LearningStatus, Post};
pub use operation::{DeadLetter, Mutation, OperationKind, PendingOperation, SequenceId};
pub use record::{Record, Table, TableRecord};

use thiserror::Error;

/// Errors raised while converting or parsing core types.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown operation kind: {0}")]
    UnknownOperation(String),

    #[error("record payload has no string `id` field")]
    MissingId,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
