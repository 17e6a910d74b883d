//! Locally-originated mutations and their durable queue entries.

use crate::record::{Record, Table};
use crate::TypesError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordering key of a pending operation. Assigned by the store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub i64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(OperationKind::Create),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(TypesError::UnknownOperation(other.to_string())),
        }
    }
}

/// A local write, as it will be replayed against the remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "payload", rename_all = "UPPERCASE")]
pub enum Mutation {
    Create(Record),
    /// Partial or full record; `id` selects the row.
    Update(Record),
    Delete { id: String },
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Create(_) => OperationKind::Create,
            Mutation::Update(_) => OperationKind::Update,
            Mutation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            Mutation::Create(record) | Mutation::Update(record) => &record.id,
            Mutation::Delete { id } => id,
        }
    }

    /// Payload persisted alongside the queue entry: the record body, or
    /// `{ "id": .. }` for deletes.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Mutation::Create(record) | Mutation::Update(record) => record.data.clone(),
            Mutation::Delete { id } => serde_json::json!({ "id": id }),
        }
    }

    /// Rebuilds a mutation from its persisted columns.
    pub fn from_parts(kind: OperationKind, record_id: String, payload: serde_json::Value) -> Self {
        match kind {
            OperationKind::Create => Mutation::Create(Record::new(record_id, payload)),
            OperationKind::Update => Mutation::Update(Record::new(record_id, payload)),
            OperationKind::Delete => Mutation::Delete { id: record_id },
        }
    }
}

/// A durable queue entry awaiting remote replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub sequence_id: SequenceId,
    pub table: Table,
    #[serde(flatten)]
    pub mutation: Mutation,
    pub enqueued_at: DateTime<Utc>,
    /// Failed remote applies so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingOperation {
    pub fn kind(&self) -> OperationKind {
        self.mutation.kind()
    }

    pub fn record_id(&self) -> &str {
        self.mutation.record_id()
    }
}

/// A queue entry parked after a permanent failure or an exhausted attempt budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub operation: PendingOperation,
    pub error: String,
    pub dead_at: DateTime<Utc>,
}
