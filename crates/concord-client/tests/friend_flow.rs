//! Friend request lifecycle against the in-memory remote: sending,
//! duplicate collapse, the broadcast fallback, responding, and blocking.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use concord_client::friends::{self, Decision, SendOutcome};
use concord_client::session;
use concord_client::Tiered;
use concord_remote::{
    direct_topic, ChangeEvent, Filter, MemoryRemote, Order, RemoteError, RemoteStore,
    TABLE_FRIEND_REQUESTS,
};
use concord_shared::password::hash_password;
use concord_shared::{FriendRequest, RequestStatus};
use concord_store::Cache;

fn harness() -> (tempfile::TempDir, Arc<MemoryRemote>, Tiered) {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::open_at(&dir.path().join("cache.db")).unwrap();
    let remote = Arc::new(MemoryRemote::new());
    let tiered = Tiered::new(remote.clone(), cache);
    (dir, remote, tiered)
}

async fn register(tiered: &Tiered, name: &str) {
    session::register(tiered, name, name, &hash_password("pw", None))
        .await
        .unwrap();
}

/// Remote whose friend_requests reads fail while every other operation
/// still works.
struct FlakyRequestReads(Arc<MemoryRemote>);

#[async_trait]
impl RemoteStore for FlakyRequestReads {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, RemoteError> {
        if table == TABLE_FRIEND_REQUESTS {
            return Err(RemoteError::Unreachable("request reads down".into()));
        }
        self.0.select(table, filter, order, limit).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError> {
        self.0.insert(table, row).await
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError> {
        self.0.update(table, filter, patch).await
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<Value, RemoteError> {
        self.0.upsert(table, row, on_conflict).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, RemoteError> {
        self.0.delete(table, filter).await
    }

    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.0.subscribe(table)
    }

    fn subscribe_direct(&self, topic: &str) -> broadcast::Receiver<Value> {
        self.0.subscribe_direct(topic)
    }

    async fn publish_direct(&self, topic: &str, payload: Value) -> Result<(), RemoteError> {
        self.0.publish_direct(topic, payload).await
    }
}

#[tokio::test]
async fn send_request_reaches_the_target() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    let outcome = friends::send_request(&tiered, "alice", "@Bob").await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            to: "bob".to_string(),
            queued: false
        }
    );
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 1);

    let theirs = friends::overview(&tiered, "bob").await.unwrap();
    assert_eq!(theirs.pending().count(), 1);
}

#[tokio::test]
async fn duplicate_requests_collapse_to_one_row() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    friends::send_request(&tiered, "alice", "bob").await.unwrap();
    let second = friends::send_request(&tiered, "alice", "bob").await.unwrap();
    assert_eq!(second, SendOutcome::AlreadyPending);

    // The reverse direction hits the same pair.
    let reverse = friends::send_request(&tiered, "bob", "alice").await.unwrap();
    assert_eq!(reverse, SendOutcome::AlreadyPending);
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 1);
}

#[tokio::test]
async fn self_add_and_unknown_targets_are_rejected() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;

    let own = friends::send_request(&tiered, "alice", "alice").await.unwrap();
    assert_eq!(own, SendOutcome::SelfAdd);
    assert_eq!(own.to_string(), "You cannot add yourself.");

    let unknown = friends::send_request(&tiered, "alice", "ghost").await.unwrap();
    assert_eq!(unknown, SendOutcome::UserNotFound);
    assert_eq!(unknown.to_string(), "User not found. Check spelling!");
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 0);
}

#[tokio::test]
async fn partial_target_resolves_through_the_fuzzy_match() {
    let (_dir, _remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;
    register(&tiered, "bobby").await;

    // No user named "bo"; the substring match picks the first candidate
    // in username order.
    let outcome = friends::send_request(&tiered, "alice", "bo").await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            to: "bob".to_string(),
            queued: false
        }
    );
}

#[tokio::test]
async fn target_resolves_through_the_uid_map() {
    let (_dir, _remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    let uid = tiered
        .with_cache(|c| c.uid_for("bob"))
        .unwrap()
        .expect("uid recorded at registration");
    let outcome = friends::send_request(&tiered, "alice", &uid).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent { .. }));
}

#[tokio::test]
async fn write_failure_falls_back_to_broadcast_and_local_queue() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    let mut bob_topic = remote.subscribe_direct(&direct_topic("bob"));
    remote.set_fail_writes(true);

    let outcome = friends::send_request(&tiered, "alice", "bob").await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Sent {
            to: "bob".to_string(),
            queued: true
        }
    );
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 0);

    // The recipient got the point-to-point payload.
    let payload = bob_topic.recv().await.unwrap();
    assert_eq!(payload["to"], "bob");

    // The sender's own overview shows the queued request.
    let mine = friends::overview(&tiered, "alice").await.unwrap();
    assert_eq!(mine.pending().count(), 1);
}

#[tokio::test]
async fn accept_makes_both_sides_friends() {
    let (_dir, _remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    friends::send_request(&tiered, "alice", "bob").await.unwrap();
    let id = friends::overview(&tiered, "bob")
        .await
        .unwrap()
        .pending()
        .next()
        .unwrap()
        .id;

    let bobs = friends::respond(&tiered, "bob", id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(bobs.friends.len(), 1);
    assert_eq!(bobs.friends[0].username, "alice");
    assert_eq!(bobs.pending().count(), 0);

    let alices = friends::overview(&tiered, "alice").await.unwrap();
    assert_eq!(alices.friends.len(), 1);
    assert_eq!(alices.friends[0].username, "bob");
}

#[tokio::test]
async fn declined_pair_can_be_asked_again() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    friends::send_request(&tiered, "alice", "bob").await.unwrap();
    let id = friends::overview(&tiered, "bob")
        .await
        .unwrap()
        .pending()
        .next()
        .unwrap()
        .id;
    friends::respond(&tiered, "bob", id, Decision::Decline)
        .await
        .unwrap();

    let again = friends::send_request(&tiered, "alice", "bob").await.unwrap();
    assert!(matches!(again, SendOutcome::Sent { queued: false, .. }));
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 1);

    let theirs = friends::overview(&tiered, "bob").await.unwrap();
    assert_eq!(theirs.pending().count(), 1);
}

#[tokio::test]
async fn blocking_removes_the_friend_and_prevents_new_requests() {
    let (_dir, _remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    friends::send_request(&tiered, "alice", "bob").await.unwrap();
    let id = friends::overview(&tiered, "bob")
        .await
        .unwrap()
        .pending()
        .next()
        .unwrap()
        .id;
    friends::respond(&tiered, "bob", id, Decision::Accept)
        .await
        .unwrap();

    let after = friends::block(&tiered, "alice", "bob").await.unwrap();
    assert!(after.friends.is_empty());
    assert_eq!(after.blocked.len(), 1);

    // Neither side can re-add while the block stands.
    let from_bob = friends::send_request(&tiered, "bob", "alice").await.unwrap();
    assert_eq!(from_bob, SendOutcome::Blocked);
    assert_eq!(from_bob.to_string(), "You cannot add this user.");
}

#[tokio::test]
async fn accepting_a_queued_only_request_promotes_it_to_the_remote() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    // Delivered to bob via the direct broadcast only; no remote row.
    let request = FriendRequest::pending("alice", "bob");
    tiered.with_cache(|c| c.queue_request(&request)).unwrap();

    let bobs = friends::respond(&tiered, "bob", request.id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(bobs.friends.len(), 1);
    assert_eq!(bobs.friends[0].username, "alice");
    assert_eq!(bobs.pending().count(), 0);

    // The answered row now lives remotely and the queue is empty.
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 1);
    assert!(tiered.with_cache(|c| c.queued_requests()).unwrap().is_empty());

    let alices = friends::overview(&tiered, "alice").await.unwrap();
    assert_eq!(alices.friends.len(), 1);
    assert_eq!(alices.friends[0].username, "bob");
}

#[tokio::test]
async fn answering_while_writes_fail_keeps_the_queued_copy() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    let request = FriendRequest::pending("alice", "bob");
    tiered.with_cache(|c| c.queue_request(&request)).unwrap();
    remote.set_fail_writes(true);

    friends::respond(&tiered, "bob", request.id, Decision::Accept)
        .await
        .unwrap();

    // Nothing reached the remote, but the answer survives locally.
    assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 0);
    let queued = tiered.with_cache(|c| c.queued_requests()).unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].status, RequestStatus::Accepted);
}

#[tokio::test]
async fn degraded_duplicate_check_never_demotes_a_friendship() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::open_at(&dir.path().join("cache.db")).unwrap();
    let inner = Arc::new(MemoryRemote::new());
    let tiered = Tiered::new(Arc::new(FlakyRequestReads(inner.clone())), cache);
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    let mut accepted = FriendRequest::pending("alice", "bob");
    accepted.status = RequestStatus::Accepted;
    inner
        .insert(TABLE_FRIEND_REQUESTS, serde_json::to_value(&accepted).unwrap())
        .await
        .unwrap();

    let outcome = friends::send_request(&tiered, "alice", "bob").await.unwrap();
    assert_eq!(outcome, SendOutcome::AlreadyPending);

    // The existing friendship row is untouched.
    let rows = inner
        .select(TABLE_FRIEND_REQUESTS, None, None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row: FriendRequest = serde_json::from_value(rows[0].clone()).unwrap();
    assert_eq!(row.status, RequestStatus::Accepted);
    assert_eq!(row.id, accepted.id);
}

#[tokio::test]
async fn responding_updates_the_row_status() {
    let (_dir, remote, tiered) = harness();
    register(&tiered, "alice").await;
    register(&tiered, "bob").await;

    friends::send_request(&tiered, "alice", "bob").await.unwrap();
    let id = friends::overview(&tiered, "bob")
        .await
        .unwrap()
        .pending()
        .next()
        .unwrap()
        .id;
    friends::respond(&tiered, "bob", id, Decision::Accept)
        .await
        .unwrap();

    let rows = remote
        .select(TABLE_FRIEND_REQUESTS, None, None, None)
        .await
        .unwrap();
    let status: RequestStatus = serde_json::from_value(rows[0]["status"].clone()).unwrap();
    assert_eq!(status, RequestStatus::Accepted);
}
