//! Entity tables and the pending-operation queue.

use crate::asset_cache::AssetCache;
use crate::error::{StorageError, StorageResult};
use crate::schema::{self, CURRENT_VERSION};
use chrono::{DateTime, Utc};
use edublog_types::{
    DeadLetter, Mutation, OperationKind, PendingOperation, Record, SequenceId, Table,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Durable record store backed by one SQLite database.
///
/// Cloning is cheap and every clone shares the same connection.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw `sync_queue` / `dead_letters` columns, converted outside the row closure.
type QueueRow = (i64, String, String, String, String, i64, u32, Option<String>);

const QUEUE_COLUMNS: &str =
    "seq, table_name, op, record_id, payload, enqueued_at, attempts, last_error";

impl LocalStore {
    /// Opens or creates a store at `path`, upgrading older schemas to
    /// [`CURRENT_VERSION`].
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_sqlite(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> StorageResult<Self> {
        schema::upgrade(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Schema version of every open handle.
    pub fn version(&self) -> u32 {
        CURRENT_VERSION
    }

    /// Returns true if both handles share one underlying connection.
    pub fn same_handle(&self, other: &LocalStore) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Asset cache sharing this store's connection.
    pub fn asset_cache(&self) -> StorageResult<AssetCache> {
        AssetCache::open_with_conn(self.conn.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering from poisoned local store mutex");
            poisoned.into_inner()
        })
    }

    // ── Entity tables ──

    /// Gets a record by id.
    pub fn get(&self, table: Table, id: &str) -> StorageResult<Option<Record>> {
        let conn = self.lock();
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {table} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        match data {
            Some(raw) => Ok(Some(Record::new(id, serde_json::from_str(&raw)?))),
            None => Ok(None),
        }
    }

    /// Lists every record in a table, ordered by id.
    pub fn get_all(&self, table: Table) -> StorageResult<Vec<Record>> {
        self.query_records(&format!("SELECT id, data FROM {table} ORDER BY id"), params![])
    }

    /// Posts filed under a category (served by `idx_posts_category`).
    pub fn posts_by_category(&self, category_id: &str) -> StorageResult<Vec<Record>> {
        self.query_records(
            "SELECT id, data FROM posts WHERE category_id = ?1 ORDER BY id",
            params![category_id],
        )
    }

    /// Posts written by an author (served by `idx_posts_author`).
    pub fn posts_by_author(&self, author_id: &str) -> StorageResult<Vec<Record>> {
        self.query_records(
            "SELECT id, data FROM posts WHERE author_id = ?1 ORDER BY id",
            params![author_id],
        )
    }

    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<Record>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|(id, raw)| Ok(Record::new(id, serde_json::from_str(&raw)?)))
            .collect()
    }

    /// Inserts or replaces a record.
    pub fn put(&self, table: Table, record: &Record) -> StorageResult<()> {
        let conn = self.lock();
        write_record(&conn, table, record)
    }

    /// Deletes a record. Returns true if a row was removed.
    pub fn delete(&self, table: Table, id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        let affected = conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
        Ok(affected > 0)
    }

    // ── Pending operations ──

    /// Appends a pending operation and returns it with its new sequence id.
    pub fn append_operation(
        &self,
        table: Table,
        mutation: &Mutation,
    ) -> StorageResult<PendingOperation> {
        let conn = self.lock();
        insert_operation(&conn, table, mutation)
    }

    /// Applies a mutation to the entity table and enqueues it, in one transaction.
    ///
    /// Updates merge the payload's top-level fields into the stored record so
    /// the local copy stays complete when the UI sends a partial record.
    pub fn apply_local(
        &self,
        table: Table,
        mutation: &Mutation,
    ) -> StorageResult<PendingOperation> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        match mutation {
            Mutation::Create(record) => write_record(&tx, table, record)?,
            Mutation::Update(partial) => {
                let existing: Option<String> = tx
                    .query_row(
                        &format!("SELECT data FROM {table} WHERE id = ?1"),
                        params![partial.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let merged = match existing {
                    Some(raw) => {
                        let mut data: serde_json::Value = serde_json::from_str(&raw)?;
                        merge_fields(&mut data, &partial.data);
                        Record::new(partial.id.clone(), data)
                    }
                    None => partial.clone(),
                };
                write_record(&tx, table, &merged)?;
            }
            Mutation::Delete { id } => {
                tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
            }
        }

        let op = insert_operation(&tx, table, mutation)?;
        tx.commit()?;
        Ok(op)
    }

    /// All pending operations, ascending by sequence id.
    pub fn list_operations(&self) -> StorageResult<Vec<PendingOperation>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY seq ASC"))?;
        let rows = stmt
            .query_map([], queue_row)?
            .collect::<Result<Vec<QueueRow>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(row_to_operation).collect()
    }

    /// Number of pending operations.
    pub fn pending_count(&self) -> StorageResult<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Removes an applied operation. Returns true if it was still queued.
    pub fn remove_operation(&self, seq: SequenceId) -> StorageResult<bool> {
        let conn = self.lock();
        let affected = conn.execute("DELETE FROM sync_queue WHERE seq = ?1", params![seq.0])?;
        Ok(affected > 0)
    }

    /// Records a failed apply on a retained entry; returns the new attempt count.
    pub fn record_failure(&self, seq: SequenceId, error: &str) -> StorageResult<u32> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2 WHERE seq = ?1",
            params![seq.0, error],
        )?;
        let attempts: Option<u32> = conn
            .query_row(
                "SELECT attempts FROM sync_queue WHERE seq = ?1",
                params![seq.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(attempts.unwrap_or(0))
    }

    /// Moves a queued operation to the dead-letter table, counting the failed
    /// attempt. Returns false if the entry was no longer queued.
    pub fn dead_letter(&self, seq: SequenceId, error: &str) -> StorageResult<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let moved = tx.execute(
            "INSERT INTO dead_letters \
             (seq, table_name, op, record_id, payload, enqueued_at, attempts, error, dead_at) \
             SELECT seq, table_name, op, record_id, payload, enqueued_at, attempts + 1, ?2, ?3 \
             FROM sync_queue WHERE seq = ?1",
            params![seq.0, error, Utc::now().timestamp_millis()],
        )?;
        tx.execute("DELETE FROM sync_queue WHERE seq = ?1", params![seq.0])?;
        tx.commit()?;
        Ok(moved > 0)
    }

    /// All dead letters, ascending by their original sequence id.
    pub fn list_dead_letters(&self) -> StorageResult<Vec<DeadLetter>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, table_name, op, record_id, payload, enqueued_at, attempts, error, dead_at \
             FROM dead_letters ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([], |row| -> rusqlite::Result<(QueueRow, String, i64)> {
                Ok((
                    (
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        None,
                    ),
                    row.get::<_, String>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter()
            .map(|(row, error, dead_at)| {
                let mut operation = row_to_operation(row)?;
                operation.last_error = Some(error.clone());
                Ok(DeadLetter {
                    operation,
                    error,
                    dead_at: millis_to_datetime(dead_at)?,
                })
            })
            .collect()
    }

    /// Moves a dead letter back to the tail of the queue under a fresh
    /// sequence id, with its attempt count reset.
    pub fn requeue_dead_letter(&self, seq: SequenceId) -> StorageResult<Option<PendingOperation>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let row: Option<(String, String, String, String)> = tx
            .query_row(
                "SELECT table_name, op, record_id, payload FROM dead_letters WHERE seq = ?1",
                params![seq.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((table_name, op, record_id, payload)) = row else {
            return Ok(None);
        };

        let table: Table = table_name.parse()?;
        let kind: OperationKind = op.parse()?;
        let mutation = Mutation::from_parts(kind, record_id, serde_json::from_str(&payload)?);
        let requeued = insert_operation(&tx, table, &mutation)?;
        tx.execute("DELETE FROM dead_letters WHERE seq = ?1", params![seq.0])?;
        tx.commit()?;

        debug!("requeued dead letter {seq} as {}", requeued.sequence_id);
        Ok(Some(requeued))
    }

    /// Drops a dead letter for good. Returns true if it existed.
    pub fn discard_dead_letter(&self, seq: SequenceId) -> StorageResult<bool> {
        let conn = self.lock();
        let affected = conn.execute("DELETE FROM dead_letters WHERE seq = ?1", params![seq.0])?;
        Ok(affected > 0)
    }
}

// ── Row helpers ──

fn write_record(conn: &Connection, table: Table, record: &Record) -> StorageResult<()> {
    let data = serde_json::to_string(&record.data)?;
    let now = Utc::now().timestamp_millis();
    match table {
        Table::Posts => {
            conn.execute(
                "INSERT OR REPLACE INTO posts (id, data, category_id, author_id, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    data,
                    record.get_str("/category_id"),
                    record.get_str("/author_id"),
                    now,
                ],
            )?;
        }
        Table::Categories => {
            conn.execute(
                "INSERT OR REPLACE INTO categories (id, data, updated_at) VALUES (?1, ?2, ?3)",
                params![record.id, data, now],
            )?;
        }
    }
    Ok(())
}

fn insert_operation(
    conn: &Connection,
    table: Table,
    mutation: &Mutation,
) -> StorageResult<PendingOperation> {
    let enqueued_at = Utc::now();
    conn.execute(
        "INSERT INTO sync_queue (table_name, op, record_id, payload, enqueued_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            table.as_str(),
            mutation.kind().as_str(),
            mutation.record_id(),
            serde_json::to_string(&mutation.payload())?,
            enqueued_at.timestamp_millis(),
        ],
    )?;
    let seq = SequenceId(conn.last_insert_rowid());
    debug!("enqueued {} {}/{} as {seq}", mutation.kind(), table, mutation.record_id());

    Ok(PendingOperation {
        sequence_id: seq,
        table,
        mutation: mutation.clone(),
        enqueued_at: millis_to_datetime(enqueued_at.timestamp_millis())?,
        attempts: 0,
        last_error: None,
    })
}

fn queue_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn row_to_operation(row: QueueRow) -> StorageResult<PendingOperation> {
    let (seq, table_name, op, record_id, payload, enqueued_at, attempts, last_error) = row;
    let table: Table = table_name.parse()?;
    let kind: OperationKind = op.parse()?;
    let payload: serde_json::Value = serde_json::from_str(&payload)?;

    Ok(PendingOperation {
        sequence_id: SequenceId(seq),
        table,
        mutation: Mutation::from_parts(kind, record_id, payload),
        enqueued_at: millis_to_datetime(enqueued_at)?,
        attempts,
        last_error,
    })
}

fn millis_to_datetime(ms: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {ms}")))
}

/// Shallow merge of `patch`'s top-level fields into `target`.
fn merge_fields(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}
