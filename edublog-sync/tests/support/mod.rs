//! Shared fakes for queue and trigger tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edublog_remote::{RemoteBackend, RemoteError, RemoteResult};
use edublog_storage::LocalStore;
use edublog_sync::{BackgroundSync, OperationQueue, SyncConfig, SyncError, SyncResult};
use edublog_types::{Mutation, Record, Table};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Insert(Table, Value),
    Update(Table, String, Value),
    Delete(Table, String),
}

impl RemoteCall {
    pub fn record_id(&self) -> &str {
        match self {
            RemoteCall::Insert(_, data) => data["id"].as_str().unwrap_or_default(),
            RemoteCall::Update(_, id, _) | RemoteCall::Delete(_, id) => id,
        }
    }
}

/// In-memory remote that records every call and can fail, stall or hang
/// on chosen record ids.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<String, u16>>,
    hanging: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every apply of `id` fails with `status`.
    pub fn fail(&self, id: &str, status: u16) {
        self.failures.lock().unwrap().insert(id.to_string(), status);
    }

    pub fn heal(&self, id: &str) {
        self.failures.lock().unwrap().remove(id);
    }

    /// Applies of `id` never complete.
    pub fn hang(&self, id: &str) {
        self.hanging.lock().unwrap().insert(id.to_string());
    }

    pub fn release(&self, id: &str) {
        self.hanging.lock().unwrap().remove(id);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.record_id().to_string()).collect()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls().iter().filter(|c| c.record_id() == id).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, id: &str, call: RemoteCall) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let hangs = self.hanging.lock().unwrap().contains(id);
        if hangs {
            std::future::pending::<()>().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self.failures.lock().unwrap().get(id).copied();
        match failure {
            Some(status) => Err(RemoteError::Status {
                status,
                body: "rejected".into(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteBackend for FakeRemote {
    async fn insert(&self, table: Table, record: &Record) -> RemoteResult<()> {
        self.handle(&record.id, RemoteCall::Insert(table, record.data.clone()))
            .await
    }

    async fn update(&self, table: Table, id: &str, partial: &Value) -> RemoteResult<()> {
        self.handle(id, RemoteCall::Update(table, id.to_string(), partial.clone()))
            .await
    }

    async fn delete_by_id(&self, table: Table, id: &str) -> RemoteResult<()> {
        self.handle(id, RemoteCall::Delete(table, id.to_string()))
            .await
    }
}

/// Background-sync facility that records registered tags.
#[derive(Default)]
pub struct FakeBackgroundSync {
    tags: Mutex<Vec<String>>,
    broken: bool,
}

impl FakeBackgroundSync {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            broken: true,
            ..Self::default()
        })
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundSync for FakeBackgroundSync {
    async fn register(&self, tag: &str) -> SyncResult<()> {
        if self.broken {
            return Err(SyncError::BackgroundSync("permission denied".into()));
        }
        self.tags.lock().unwrap().push(tag.to_string());
        Ok(())
    }
}

pub fn queue_with(config: SyncConfig) -> Arc<OperationQueue> {
    Arc::new(OperationQueue::new(LocalStore::open_in_memory().unwrap(), config))
}

pub fn queue() -> Arc<OperationQueue> {
    queue_with(SyncConfig::default())
}

pub fn create(id: &str, title: &str) -> Mutation {
    Mutation::Create(Record::new(id, json!({ "id": id, "title": title })))
}

pub fn update(id: &str, title: &str) -> Mutation {
    Mutation::Update(Record::new(id, json!({ "id": id, "title": title })))
}

pub fn delete(id: &str) -> Mutation {
    Mutation::Delete { id: id.to_string() }
}
