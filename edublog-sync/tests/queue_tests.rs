mod support;

use edublog_storage::LocalStore;
use edublog_sync::{OperationQueue, RemoteApply, SyncConfig};
use edublog_types::{OperationKind, PendingOperation, Table};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use support::*;

fn ids(ops: &[PendingOperation]) -> Vec<String> {
    ops.iter().map(|op| op.record_id().to_string()).collect()
}

// ── Enqueue ──────────────────────────────────────────────────────

#[tokio::test]
async fn enqueue_persists_without_network() {
    let queue = queue();
    let remote = FakeRemote::new();

    let op = queue.enqueue(Table::Posts, create("p1", "A")).await.unwrap();

    assert_eq!(op.kind(), OperationKind::Create);
    assert_eq!(queue.pending().await.unwrap(), vec![op]);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn apply_local_updates_store_and_queue() {
    let queue = queue();
    queue.apply_local(Table::Posts, create("p1", "A")).await.unwrap();
    queue.apply_local(Table::Posts, update("p1", "B")).await.unwrap();

    let stored = queue.store().get(Table::Posts, "p1").unwrap().unwrap();
    assert_eq!(stored.get_str("/title"), Some("B"));
    assert_eq!(queue.pending_count().await.unwrap(), 2);
}

// ── Drain ────────────────────────────────────────────────────────

#[tokio::test]
async fn drain_replays_in_sequence_order() {
    let queue = queue();
    let remote = FakeRemote::new();
    queue.enqueue(Table::Posts, create("p1", "A")).await.unwrap();
    queue.enqueue(Table::Categories, create("c1", "Rust")).await.unwrap();
    queue.enqueue(Table::Posts, update("p1", "B")).await.unwrap();
    queue.enqueue(Table::Posts, delete("p2")).await.unwrap();

    let report = queue.drain(remote.as_ref()).await.unwrap();

    assert_eq!(report.applied, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.passes, 1);
    assert!(!report.skipped);
    assert_eq!(
        remote.calls(),
        vec![
            RemoteCall::Insert(Table::Posts, json!({ "id": "p1", "title": "A" })),
            RemoteCall::Insert(Table::Categories, json!({ "id": "c1", "title": "Rust" })),
            RemoteCall::Update(Table::Posts, "p1".into(), json!({ "id": "p1", "title": "B" })),
            RemoteCall::Delete(Table::Posts, "p2".into()),
        ]
    );
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn drain_of_empty_queue_does_nothing() {
    let queue = queue();
    let remote = FakeRemote::new();
    let report = queue.drain(remote.as_ref()).await.unwrap();
    assert_eq!(report.attempted(), 0);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn failed_entries_stay_in_order_and_others_progress() {
    let queue = queue();
    let remote = FakeRemote::new();
    for id in ["e1", "e2", "e3", "e4", "e5"] {
        queue.enqueue(Table::Posts, create(id, id)).await.unwrap();
    }
    remote.fail("e2", 503);
    remote.fail("e4", 503);

    let report = queue.drain(remote.as_ref()).await.unwrap();

    assert_eq!(report.applied, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(remote.call_ids(), vec!["e1", "e2", "e3", "e4", "e5"]);

    let remaining = queue.pending().await.unwrap();
    assert_eq!(ids(&remaining), vec!["e2", "e4"]);
    assert!(remaining[0].sequence_id < remaining[1].sequence_id);
    assert_eq!(remaining[0].attempts, 1);
    assert!(remaining[0].last_error.as_deref().unwrap().contains("503"));

    remote.heal("e2");
    remote.heal("e4");
    let report = queue.drain(remote.as_ref()).await.unwrap();
    assert_eq!(report.applied, 2);
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn permanent_failure_is_dead_lettered() {
    let queue = queue();
    let remote = FakeRemote::new();
    queue.enqueue(Table::Posts, create("bad", "A")).await.unwrap();
    queue.enqueue(Table::Posts, create("good", "B")).await.unwrap();
    remote.fail("bad", 400);

    let report = queue.drain(remote.as_ref()).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.dead_lettered, 1);
    assert!(queue.pending().await.unwrap().is_empty());

    let letters = queue.dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].operation.record_id(), "bad");
    assert!(letters[0].error.contains("400"));
}

#[tokio::test]
async fn permanent_failure_is_retained_when_dead_lettering_is_off() {
    let queue = queue_with(SyncConfig {
        dead_letter_permanent: false,
        ..SyncConfig::default()
    });
    let remote = FakeRemote::new();
    queue.enqueue(Table::Posts, create("bad", "A")).await.unwrap();
    remote.fail("bad", 422);

    let report = queue.drain(remote.as_ref()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn attempt_budget_dead_letters_transient_failures() {
    let queue = queue_with(SyncConfig {
        max_attempts: Some(2),
        ..SyncConfig::default()
    });
    let remote = FakeRemote::new();
    queue.enqueue(Table::Posts, delete("p1")).await.unwrap();
    remote.fail("p1", 503);

    let first = queue.drain(remote.as_ref()).await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(queue.pending_count().await.unwrap(), 1);

    let second = queue.drain(remote.as_ref()).await.unwrap();
    assert_eq!(second.dead_lettered, 1);
    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert_eq!(queue.dead_letters().await.unwrap()[0].operation.attempts, 2);
}

#[tokio::test]
async fn requeued_dead_letter_drains_again() {
    let queue = queue();
    let remote = FakeRemote::new();
    let op = queue.enqueue(Table::Posts, create("p1", "A")).await.unwrap();
    remote.fail("p1", 400);
    queue.drain(remote.as_ref()).await.unwrap();

    remote.heal("p1");
    let requeued = queue.requeue_dead_letter(op.sequence_id).await.unwrap().unwrap();
    assert!(requeued.sequence_id > op.sequence_id);

    let report = queue.drain(remote.as_ref()).await.unwrap();
    assert_eq!(report.applied, 1);
    assert!(queue.dead_letters().await.unwrap().is_empty());
    assert!(!queue.discard_dead_letter(op.sequence_id).await.unwrap());
}

#[tokio::test]
async fn slow_apply_times_out_and_is_retained() {
    let queue = queue_with(SyncConfig {
        apply_timeout_ms: 50,
        ..SyncConfig::default()
    });
    let remote = FakeRemote::new();
    queue.enqueue(Table::Posts, create("stuck", "A")).await.unwrap();
    queue.enqueue(Table::Posts, create("next", "B")).await.unwrap();
    remote.hang("stuck");

    let report = queue.drain(remote.as_ref()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 1);
    let remaining = queue.pending().await.unwrap();
    assert_eq!(ids(&remaining), vec!["stuck"]);
    assert!(remaining[0].last_error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn interrupted_drain_resumes_after_last_removed_entry() {
    let queue = queue();
    let remote = FakeRemote::new();
    for id in ["e1", "e2", "e3"] {
        queue.enqueue(Table::Posts, create(id, id)).await.unwrap();
    }
    remote.hang("e2");

    // Drop the drain mid-apply, as a process kill would.
    let interrupted =
        tokio::time::timeout(Duration::from_millis(300), queue.drain(remote.as_ref())).await;
    assert!(interrupted.is_err());
    assert_eq!(ids(&queue.pending().await.unwrap()), vec!["e2", "e3"]);
    assert!(!queue.is_draining());

    remote.release("e2");
    let report = queue.drain(remote.as_ref()).await.unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(remote.calls_for("e1"), 1);
    assert_eq!(remote.calls_for("e3"), 1);
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn queue_survives_restart_after_interrupted_drain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edublog.db");
    let remote = FakeRemote::new();
    remote.hang("e2");

    {
        let store = LocalStore::open(&path).unwrap();
        let queue = OperationQueue::new(store, SyncConfig::default());
        for id in ["e1", "e2", "e3"] {
            queue.enqueue(Table::Posts, create(id, id)).await.unwrap();
        }
        let interrupted =
            tokio::time::timeout(Duration::from_millis(300), queue.drain(remote.as_ref())).await;
        assert!(interrupted.is_err());
    }

    remote.release("e2");
    let queue = OperationQueue::new(LocalStore::open(&path).unwrap(), SyncConfig::default());
    assert_eq!(ids(&queue.pending().await.unwrap()), vec!["e2", "e3"]);

    let report = queue.drain(remote.as_ref()).await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(remote.calls_for("e1"), 1);
    assert!(queue.pending().await.unwrap().is_empty());
}

// ── Single flight ────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_drains_never_double_apply() {
    let queue = queue();
    let remote = FakeRemote::new();
    remote.set_delay(Duration::from_millis(30));
    for id in ["e1", "e2", "e3"] {
        queue.enqueue(Table::Posts, create(id, id)).await.unwrap();
    }

    let (a, b) = tokio::join!(queue.drain(remote.as_ref()), queue.drain(remote.as_ref()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.skipped ^ b.skipped);
    assert_eq!(a.applied + b.applied, 3);
    assert_eq!(remote.call_ids(), vec!["e1", "e2", "e3"]);
    assert_eq!(remote.max_in_flight(), 1);
}

#[tokio::test]
async fn drain_requested_mid_drain_gets_an_extra_pass() {
    let queue = queue();
    let remote = FakeRemote::new();
    remote.set_delay(Duration::from_millis(50));
    remote.fail("e1", 503);
    queue.enqueue(Table::Posts, create("e1", "A")).await.unwrap();
    queue.enqueue(Table::Posts, create("e2", "B")).await.unwrap();

    let late = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(Table::Posts, create("e3", "C")).await.unwrap();
        queue.drain(remote.as_ref()).await.unwrap()
    };
    let (first, second) = tokio::join!(queue.drain(remote.as_ref()), late);
    let first = first.unwrap();

    assert!(second.skipped);
    assert_eq!(first.passes, 2);
    assert_eq!(first.applied, 2);
    assert_eq!(first.failed, 1);
    // e1 failed in the first pass and is not retried by the second
    assert_eq!(remote.calls_for("e1"), 1);
    assert_eq!(ids(&queue.pending().await.unwrap()), vec!["e1"]);
}

// ── Remote dispatch ──────────────────────────────────────────────

#[tokio::test]
async fn remote_apply_dispatches_by_operation_kind() {
    let queue = queue();
    let remote = FakeRemote::new();
    let ops = vec![
        queue.enqueue(Table::Posts, create("p1", "A")).await.unwrap(),
        queue.enqueue(Table::Posts, update("p1", "B")).await.unwrap(),
        queue.enqueue(Table::Categories, delete("c1")).await.unwrap(),
    ];

    for op in &ops {
        remote.apply(op).await.unwrap();
    }

    assert_eq!(
        remote.calls(),
        vec![
            RemoteCall::Insert(Table::Posts, json!({ "id": "p1", "title": "A" })),
            RemoteCall::Update(Table::Posts, "p1".into(), json!({ "id": "p1", "title": "B" })),
            RemoteCall::Delete(Table::Categories, "c1".into()),
        ]
    );
    assert!(ops.windows(2).all(|w| w[0].sequence_id < w[1].sequence_id));
}
