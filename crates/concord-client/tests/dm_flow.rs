//! DM thread and message behavior against the in-memory remote.

use std::sync::Arc;

use concord_client::{dms, Tiered};
use concord_remote::{MemoryRemote, RemoteStore, TABLE_DMS};
use concord_shared::Route;
use concord_store::Cache;

fn harness() -> (tempfile::TempDir, Arc<MemoryRemote>, Tiered) {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::open_at(&dir.path().join("cache.db")).unwrap();
    let remote = Arc::new(MemoryRemote::new());
    let tiered = Tiered::new(remote.clone(), cache);
    (dir, remote, tiered)
}

#[tokio::test]
async fn opening_a_thread_twice_reuses_the_same_id() {
    let (_dir, remote, tiered) = harness();

    let first = dms::open_thread(&tiered, "alice", "bob").await.unwrap();
    // The other side navigating lands on the same thread.
    let second = dms::open_thread(&tiered, "bob", "alice").await.unwrap();

    assert_eq!(first, second);
    assert!(matches!(first, Route::DmThread { .. }));
    assert_eq!(remote.row_count(TABLE_DMS), 1);
}

#[tokio::test]
async fn thread_route_renders_the_me_path() {
    let (_dir, _remote, tiered) = harness();
    let route = dms::open_thread(&tiered, "alice", "bob").await.unwrap();
    let rendered = route.to_string();
    let Route::DmThread { dm_id } = route else {
        panic!("expected a dm route");
    };
    assert_eq!(rendered, format!("/channels/me/{dm_id}"));
}

#[tokio::test]
async fn messages_come_back_oldest_first_for_both_sides() {
    let (_dir, _remote, tiered) = harness();
    dms::open_thread(&tiered, "alice", "bob").await.unwrap();

    dms::send_message(&tiered, "alice", "bob", "hi").await.unwrap();
    dms::send_message(&tiered, "bob", "alice", "hey").await.unwrap();
    dms::send_message(&tiered, "alice", "bob", "how are you").await.unwrap();

    let texts: Vec<String> = dms::load_messages(&tiered, "alice", "bob")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, ["hi", "hey", "how are you"]);

    // The unordered pair filter gives bob the identical view.
    let theirs = dms::load_messages(&tiered, "bob", "alice").await.unwrap();
    assert_eq!(theirs.len(), 3);
}

#[tokio::test]
async fn malformed_message_rows_are_skipped() {
    let (_dir, remote, tiered) = harness();
    dms::send_message(&tiered, "alice", "bob", "hi").await.unwrap();
    remote
        .insert(
            "dm_messages",
            serde_json::json!({"pair_a": "alice", "pair_b": "bob", "garbage": true}),
        )
        .await
        .unwrap();

    let messages = dms::load_messages(&tiered, "alice", "bob").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "hi");
}

#[tokio::test]
async fn unreachable_remote_surfaces_an_error() {
    let (_dir, remote, tiered) = harness();
    remote.set_offline(true);
    assert!(dms::open_thread(&tiered, "alice", "bob").await.is_err());
    assert!(dms::load_messages(&tiered, "alice", "bob").await.is_err());
}
