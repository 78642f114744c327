//! Realtime change listener.
//!
//! Subscribes to the CDC feeds for friend requests and DM messages plus
//! the viewer's direct broadcast topic, and turns every relevant event
//! into a coarse [`Refresh`] signal.  There is no incremental state
//! reconciliation: the UI refetches on each signal.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use concord_remote::{direct_topic, TABLE_DM_MESSAGES, TABLE_FRIEND_REQUESTS};
use concord_shared::FriendRequest;

use crate::repo::Tiered;

/// Which screen should refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    FriendRequests,
    Dms,
}

/// Handle over the spawned listener tasks; dropping it stops them.
pub struct ChangeListener {
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeListener {
    /// Start listening on behalf of `username`.  Signals stop when
    /// `refresh` is closed or the listener is dropped.
    pub fn spawn(tiered: Tiered, username: &str, refresh: mpsc::Sender<Refresh>) -> Self {
        let me = username.to_string();
        let mut tasks = Vec::with_capacity(3);

        let mut requests = tiered.remote().subscribe(TABLE_FRIEND_REQUESTS);
        let tx = refresh.clone();
        let user = me.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match requests.recv().await {
                    Ok(event) => {
                        if involves(&event.record, &user) && tx.send(Refresh::FriendRequests).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "friend request feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        let mut messages = tiered.remote().subscribe(TABLE_DM_MESSAGES);
        let tx = refresh.clone();
        let user = me.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(event) => {
                        if pair_involves(&event.record, &user) && tx.send(Refresh::Dms).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "dm feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        let mut direct = tiered.remote().subscribe_direct(&direct_topic(&me));
        tasks.push(tokio::spawn(async move {
            loop {
                match direct.recv().await {
                    Ok(payload) => {
                        // Broadcast-delivered requests never reached the
                        // table, so merge them into the local queue before
                        // signalling.
                        match serde_json::from_value::<FriendRequest>(payload) {
                            Ok(request) => {
                                if let Err(err) = tiered.with_cache(|c| c.queue_request(&request)) {
                                    warn!(%err, "broadcast request not queued");
                                }
                            }
                            Err(err) => {
                                warn!(%err, "discarding malformed broadcast payload");
                            }
                        }
                        if refresh.send(Refresh::FriendRequests).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "direct topic lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        Self { tasks }
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Whether a friend request row touches `user`.  Rows without the side
/// columns (partial delete images) pass through.
fn involves(record: &serde_json::Value, user: &str) -> bool {
    match (record.get("from"), record.get("to")) {
        (Some(from), Some(to)) => from == user || to == user,
        _ => true,
    }
}

/// Whether a DM message row touches `user` via its pair columns.
fn pair_involves(record: &serde_json::Value, user: &str) -> bool {
    match (record.get("pair_a"), record.get("pair_b")) {
        (Some(a), Some(b)) => a == user || b == user,
        _ => true,
    }
}
