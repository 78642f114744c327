//! The table-oriented remote store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::filter::{Filter, Order};

/// Table names on the remote service.
pub const TABLE_USERS: &str = "users";
pub const TABLE_FRIEND_REQUESTS: &str = "friend_requests";
pub const TABLE_BLOCKED_USERS: &str = "blocked_users";
pub const TABLE_DMS: &str = "dms";
pub const TABLE_DM_MESSAGES: &str = "dm_messages";

/// The named point-to-point broadcast topic for a recipient.
pub fn direct_topic(username: &str) -> String {
    format!("friend_requests_direct:{username}")
}

/// Kind of row change carried by a CDC event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// A change-data-capture event for one table row.
///
/// There is no incremental diff contract: listeners treat any event as
/// "something changed, refetch everything".  `record` carries whatever
/// columns the transport included (the deleted row's old image for
/// deletes).
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub table: String,
    pub action: ChangeAction,
    pub record: Value,
}

/// Table-oriented access to the hosted relational store.
///
/// Rows travel as `serde_json::Value`; callers decode them into their
/// record schemas at the boundary.  All write operations are single
/// attempts with no retry policy.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Select rows matching `filter`, optionally ordered and limited.
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>>;

    /// Insert one row; returns the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// Patch all rows matching `filter`; returns the updated rows.
    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>>;

    /// Insert-or-merge keyed on the `on_conflict` column.
    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<Value>;

    /// Delete all rows matching `filter`; returns the number removed.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64>;

    /// Subscribe to the CDC feed for a table.
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;

    /// Subscribe to a named point-to-point broadcast topic.
    fn subscribe_direct(&self, topic: &str) -> broadcast::Receiver<Value>;

    /// Publish a payload on a named broadcast topic (at-most-once; no
    /// durability for recipients that are offline at broadcast time).
    async fn publish_direct(&self, topic: &str, payload: Value) -> Result<()>;
}
