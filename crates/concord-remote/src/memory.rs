//! In-process backend.
//!
//! Serves two roles: the test double for everything above this crate,
//! and the degraded-operation stand-in when no remote endpoint is
//! configured.  Unlike the legacy client-side check-then-act scheme, this
//! backend enforces declared unique keys itself, so duplicate-creation
//! races collapse at the storage layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{RemoteError, Result};
use crate::filter::{Filter, Order};
use crate::hub::Hub;
use crate::store::{ChangeAction, ChangeEvent, RemoteStore};

/// In-memory table store with native CDC emission.
pub struct MemoryRemote {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    /// Declared unique keys, `table -> column`.
    unique: HashMap<String, &'static str>,
    hub: Hub,
    offline: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let mut unique = HashMap::new();
        unique.insert("users".to_string(), "username");
        unique.insert("friend_requests".to_string(), "pair_key");
        unique.insert("dms".to_string(), "pair_key");

        Self {
            tables: Mutex::new(HashMap::new()),
            unique,
            hub: Hub::new(),
            offline: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Simulate a fully unreachable remote (reads and writes fail).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulate write rejection while reads still work, for exercising
    /// the broadcast-fallback path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of rows currently in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().expect("table lock");
        tables.get(table).map(Vec::len).unwrap_or(0)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("remote offline".into()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_reachable()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("write rejected".into()));
        }
        Ok(())
    }

    fn emit(&self, table: &str, action: ChangeAction, record: Value) {
        self.hub.emit(ChangeEvent {
            table: table.to_string(),
            action,
            record,
        });
    }
}

/// Merge `patch`'s keys into `row` (object-level merge).
fn merge_into(row: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(source)) = (row, patch) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>> {
        self.check_reachable()?;
        let tables = self.tables.lock().expect("table lock");
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.map(|f| f.matches(row)).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            // RFC 3339 timestamps and plain strings both sort correctly
            // as text.
            rows.sort_by(|a, b| {
                let ka = column_text(a, &order.column).unwrap_or_default();
                let kb = column_text(b, &order.column).unwrap_or_default();
                if order.ascending {
                    ka.cmp(&kb)
                } else {
                    kb.cmp(&ka)
                }
            });
        }

        if let Some(limit) = limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.check_writable()?;
        let mut tables = self.tables.lock().expect("table lock");
        let rows = tables.entry(table.to_string()).or_default();

        if let Some(col) = self.unique.get(table) {
            if let Some(key) = column_text(&row, col) {
                if rows.iter().any(|r| column_text(r, col).as_deref() == Some(&key)) {
                    return Err(RemoteError::Conflict(format!("{table}.{col}")));
                }
            }
        }

        rows.push(row.clone());
        drop(tables);
        self.emit(table, ChangeAction::Insert, row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        self.check_writable()?;
        let mut tables = self.tables.lock().expect("table lock");
        let rows = tables.entry(table.to_string()).or_default();

        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if filter.matches(row) {
                merge_into(row, &patch);
                updated.push(row.clone());
            }
        }
        drop(tables);

        for row in &updated {
            self.emit(table, ChangeAction::Update, row.clone());
        }
        Ok(updated)
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<Value> {
        self.check_writable()?;
        let mut tables = self.tables.lock().expect("table lock");
        let rows = tables.entry(table.to_string()).or_default();

        let key = column_text(&row, on_conflict);
        let existing = key.as_ref().and_then(|key| {
            rows.iter()
                .position(|r| column_text(r, on_conflict).as_deref() == Some(key))
        });

        match existing {
            Some(i) => {
                merge_into(&mut rows[i], &row);
                let merged = rows[i].clone();
                drop(tables);
                self.emit(table, ChangeAction::Update, merged.clone());
                Ok(merged)
            }
            None => {
                rows.push(row.clone());
                drop(tables);
                self.emit(table, ChangeAction::Insert, row.clone());
                Ok(row)
            }
        }
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64> {
        self.check_writable()?;
        let mut tables = self.tables.lock().expect("table lock");
        let rows = tables.entry(table.to_string()).or_default();

        let mut removed = Vec::new();
        rows.retain(|row| {
            if filter.matches(row) {
                removed.push(row.clone());
                false
            } else {
                true
            }
        });
        drop(tables);

        let count = removed.len() as u64;
        for row in removed {
            self.emit(table, ChangeAction::Delete, row);
        }
        Ok(count)
    }

    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.hub.subscribe_table(table)
    }

    fn subscribe_direct(&self, topic: &str) -> broadcast::Receiver<Value> {
        self.hub.subscribe_direct(topic)
    }

    async fn publish_direct(&self, topic: &str, payload: Value) -> Result<()> {
        self.check_reachable()?;
        self.hub.emit_direct(topic, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TABLE_FRIEND_REQUESTS;
    use serde_json::json;

    #[tokio::test]
    async fn duplicate_unique_key_insert_conflicts() {
        let remote = MemoryRemote::new();
        let row = json!({"pair_key": "alice:bob", "from": "alice", "to": "bob"});
        remote.insert(TABLE_FRIEND_REQUESTS, row.clone()).await.unwrap();

        let err = remote.insert(TABLE_FRIEND_REQUESTS, row).await.unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(_)));
        assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 1);
    }

    #[tokio::test]
    async fn upsert_on_pair_key_is_idempotent() {
        let remote = MemoryRemote::new();
        let row = json!({"pair_key": "alice:bob", "status": "pending"});
        remote.upsert(TABLE_FRIEND_REQUESTS, row.clone(), "pair_key").await.unwrap();
        remote.upsert(TABLE_FRIEND_REQUESTS, row, "pair_key").await.unwrap();
        assert_eq!(remote.row_count(TABLE_FRIEND_REQUESTS), 1);
    }

    #[tokio::test]
    async fn select_applies_filter_order_and_limit() {
        let remote = MemoryRemote::new();
        for (user, time) in [("a", "2024-01-02T00:00:00Z"), ("a", "2024-01-01T00:00:00Z"), ("b", "2024-01-03T00:00:00Z")] {
            remote
                .insert("dm_messages", json!({"user": user, "time": time}))
                .await
                .unwrap();
        }

        let rows = remote
            .select(
                "dm_messages",
                Some(&Filter::eq("user", "a")),
                Some(&Order::asc("time")),
                Some(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["time"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn inserts_emit_cdc_events() {
        let remote = MemoryRemote::new();
        let mut rx = remote.subscribe(TABLE_FRIEND_REQUESTS);
        remote
            .insert(TABLE_FRIEND_REQUESTS, json!({"pair_key": "a:b"}))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.action, ChangeAction::Insert);
        assert_eq!(event.record["pair_key"], "a:b");
    }

    #[tokio::test]
    async fn offline_remote_fails_reads_and_writes() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        assert!(remote.select("users", None, None, None).await.is_err());
        assert!(remote.insert("users", json!({})).await.is_err());

        remote.set_offline(false);
        remote.set_fail_writes(true);
        assert!(remote.select("users", None, None, None).await.is_ok());
        assert!(remote.insert("users", json!({})).await.is_err());
    }
}
