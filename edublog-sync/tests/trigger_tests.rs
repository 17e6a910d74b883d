mod support;

use edublog_sync::{SyncConfig, SyncTrigger, TriggerOutcome, SYNC_TAG};
use edublog_types::Table;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::*;

fn trigger(remote: &Arc<FakeRemote>) -> SyncTrigger {
    SyncTrigger::new(queue(), remote.clone())
}

#[test]
fn default_sync_tag() {
    assert_eq!(SYNC_TAG, "sync-posts");
    assert_eq!(SyncConfig::default().sync_tag, SYNC_TAG);
    assert_eq!(SyncConfig::default().apply_timeout(), Duration::from_secs(15));
    assert!(SyncConfig::default().max_attempts.is_none());
}

#[test]
fn online_edges() {
    let remote = FakeRemote::new();
    let trigger = trigger(&remote);

    assert!(trigger.is_online());
    assert!(!trigger.set_online(true));
    assert!(!trigger.set_online(false));
    assert!(!trigger.is_online());
    assert!(trigger.set_online(true));
    assert!(!trigger.set_online(true));
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn offline_edits_replay_in_order_on_reconnect() {
    let remote = FakeRemote::new();
    let trigger = trigger(&remote);
    trigger.set_online(false);

    trigger.record(Table::Posts, create("p1", "A")).await.unwrap();
    trigger.record(Table::Posts, update("p1", "B")).await.unwrap();

    assert!(remote.calls().is_empty());
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 2);
    let local = trigger.queue().store().get(Table::Posts, "p1").unwrap().unwrap();
    assert_eq!(local.get_str("/title"), Some("B"));

    let report = trigger.on_reconnect().await.unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(
        remote.calls(),
        vec![
            RemoteCall::Insert(Table::Posts, json!({ "id": "p1", "title": "A" })),
            RemoteCall::Update(Table::Posts, "p1".into(), json!({ "id": "p1", "title": "B" })),
        ]
    );
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 0);
    assert!(trigger.is_online());
}

#[tokio::test]
async fn without_background_sync_a_write_drains_immediately() {
    let remote = FakeRemote::new();
    let trigger = trigger(&remote);

    trigger.record(Table::Posts, delete("p7")).await.unwrap();

    assert_eq!(remote.calls(), vec![RemoteCall::Delete(Table::Posts, "p7".into())]);
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn enqueue_without_background_sync_drains() {
    let remote = FakeRemote::new();
    let trigger = trigger(&remote);

    trigger.enqueue(Table::Categories, create("c1", "Rust")).await.unwrap();

    assert_eq!(remote.call_ids(), vec!["c1"]);
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn remote_failure_does_not_fail_the_local_write() {
    let remote = FakeRemote::new();
    remote.fail("p1", 503);
    let trigger = trigger(&remote);

    let op = trigger.record(Table::Posts, create("p1", "A")).await.unwrap();

    assert_eq!(op.record_id(), "p1");
    assert!(trigger.queue().store().get(Table::Posts, "p1").unwrap().is_some());
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn offline_schedule_is_deferred() {
    let remote = FakeRemote::new();
    let trigger = trigger(&remote);
    trigger.set_online(false);

    let outcome = trigger.schedule_if_no_background_sync().await.unwrap();
    assert_eq!(outcome, TriggerOutcome::Deferred);
}

#[tokio::test]
async fn schedule_without_background_sync_reports_the_drain() {
    let remote = FakeRemote::new();
    let trigger = trigger(&remote);
    trigger.queue().enqueue(Table::Posts, delete("p1")).await.unwrap();

    match trigger.schedule_if_no_background_sync().await.unwrap() {
        TriggerOutcome::Drained(report) => assert_eq!(report.applied, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// ── Background sync ──────────────────────────────────────────────

#[tokio::test]
async fn background_sync_registers_tag_instead_of_draining() {
    let remote = FakeRemote::new();
    let background = FakeBackgroundSync::new();
    let trigger = SyncTrigger::new(queue(), remote.clone()).with_background_sync(background.clone());

    trigger.record(Table::Posts, create("p1", "A")).await.unwrap();

    assert!(remote.calls().is_empty());
    assert_eq!(background.tags(), vec!["sync-posts"]);
    assert_eq!(
        trigger.schedule_if_no_background_sync().await.unwrap(),
        TriggerOutcome::Registered {
            tag: "sync-posts".into()
        }
    );

    let report = trigger.on_background_sync_signal("sync-posts").await.unwrap().unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_tag_is_ignored() {
    let remote = FakeRemote::new();
    let trigger = SyncTrigger::new(queue(), remote.clone()).with_background_sync(FakeBackgroundSync::new());
    trigger.record(Table::Posts, create("p1", "A")).await.unwrap();

    let report = trigger.on_background_sync_signal("sync-comments").await.unwrap();

    assert!(report.is_none());
    assert!(remote.calls().is_empty());
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn failed_registration_falls_back_to_draining() {
    let remote = FakeRemote::new();
    let trigger = SyncTrigger::new(queue(), remote.clone()).with_background_sync(FakeBackgroundSync::broken());

    trigger.record(Table::Posts, create("p1", "A")).await.unwrap();

    assert_eq!(remote.call_ids(), vec!["p1"]);
    assert_eq!(trigger.queue().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn background_sync_can_be_removed() {
    let remote = FakeRemote::new();
    let trigger = SyncTrigger::new(queue(), remote.clone()).with_background_sync(FakeBackgroundSync::new());
    trigger.set_background_sync(None);

    trigger.record(Table::Posts, delete("p1")).await.unwrap();
    assert_eq!(remote.call_ids(), vec!["p1"]);
}

// ── Connectivity watcher ─────────────────────────────────────────

#[tokio::test]
async fn watcher_drains_on_reconnect() {
    let remote = FakeRemote::new();
    let trigger = Arc::new(trigger(&remote));
    let (tx, rx) = tokio::sync::watch::channel(false);
    let watcher = trigger.clone().watch_connectivity(rx);

    // Let the watcher observe the initial offline state.
    tokio::time::timeout(Duration::from_secs(2), async {
        while trigger.is_online() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    trigger.record(Table::Posts, create("p1", "A")).await.unwrap();
    assert!(remote.calls().is_empty());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while trigger.queue().pending_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(remote.call_ids(), vec!["p1"]);
    drop(tx);
    watcher.await.unwrap();
}
