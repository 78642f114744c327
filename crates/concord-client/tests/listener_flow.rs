//! Realtime listener behavior: CDC and direct-broadcast events turn
//! into refresh signals and local queue merges.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use concord_client::{ChangeListener, Refresh, Tiered};
use concord_remote::{direct_topic, MemoryRemote, RemoteStore, TABLE_DM_MESSAGES, TABLE_FRIEND_REQUESTS};
use concord_shared::FriendRequest;
use concord_store::Cache;

fn harness() -> (tempfile::TempDir, Arc<MemoryRemote>, Tiered) {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::open_at(&dir.path().join("cache.db")).unwrap();
    let remote = Arc::new(MemoryRemote::new());
    let tiered = Tiered::new(remote.clone(), cache);
    (dir, remote, tiered)
}

async fn expect_signal(rx: &mut mpsc::Receiver<Refresh>) -> Refresh {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("signal within deadline")
        .expect("channel open")
}

#[tokio::test]
async fn request_row_changes_signal_a_friend_refresh() {
    let (_dir, remote, tiered) = harness();
    let (tx, mut rx) = mpsc::channel(8);
    let _listener = ChangeListener::spawn(tiered, "bob", tx);

    let request = FriendRequest::pending("alice", "bob");
    remote
        .insert(TABLE_FRIEND_REQUESTS, serde_json::to_value(&request).unwrap())
        .await
        .unwrap();

    assert_eq!(expect_signal(&mut rx).await, Refresh::FriendRequests);
}

#[tokio::test]
async fn unrelated_request_rows_are_filtered_out() {
    let (_dir, remote, tiered) = harness();
    let (tx, mut rx) = mpsc::channel(8);
    let _listener = ChangeListener::spawn(tiered, "carol", tx);

    let request = FriendRequest::pending("alice", "bob");
    remote
        .insert(TABLE_FRIEND_REQUESTS, serde_json::to_value(&request).unwrap())
        .await
        .unwrap();

    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "no signal expected for a pair carol is not part of"
    );
}

#[tokio::test]
async fn dm_rows_signal_a_dm_refresh() {
    let (_dir, remote, tiered) = harness();
    let (tx, mut rx) = mpsc::channel(8);
    let _listener = ChangeListener::spawn(tiered, "bob", tx);

    remote
        .insert(
            TABLE_DM_MESSAGES,
            serde_json::json!({
                "pair_a": "alice", "pair_b": "bob", "user": "alice",
                "text": "hi", "time": "2024-01-01T00:00:00Z"
            }),
        )
        .await
        .unwrap();

    assert_eq!(expect_signal(&mut rx).await, Refresh::Dms);
}

#[tokio::test]
async fn direct_broadcasts_merge_into_the_local_queue() {
    let (_dir, remote, tiered) = harness();
    let (tx, mut rx) = mpsc::channel(8);
    let listener_tiered = tiered.clone();
    let _listener = ChangeListener::spawn(listener_tiered, "bob", tx);

    let request = FriendRequest::pending("alice", "bob");
    remote
        .publish_direct(&direct_topic("bob"), serde_json::to_value(&request).unwrap())
        .await
        .unwrap();

    assert_eq!(expect_signal(&mut rx).await, Refresh::FriendRequests);
    let queued = tiered.with_cache(|c| c.queued_requests()).unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, request.id);
}

#[tokio::test]
async fn shutdown_stops_signalling() {
    let (_dir, remote, tiered) = harness();
    let (tx, mut rx) = mpsc::channel(8);
    let mut listener = ChangeListener::spawn(tiered, "bob", tx);
    listener.shutdown();

    let request = FriendRequest::pending("alice", "bob");
    remote
        .insert(TABLE_FRIEND_REQUESTS, serde_json::to_value(&request).unwrap())
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
}
