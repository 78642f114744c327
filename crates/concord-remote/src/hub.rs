//! Fan-out hub for realtime events.
//!
//! Both backends deliver CDC events and direct-topic payloads through
//! this hub: the memory backend emits into it synchronously, the HTTP
//! backend's socket task feeds it from the wire.  Slow subscribers may
//! lag and drop events; the refetch-everything consumption model
//! tolerates that.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::store::ChangeEvent;

const CHANNEL_CAPACITY: usize = 64;

/// Per-table CDC senders plus per-topic direct senders.
#[derive(Default)]
pub struct Hub {
    tables: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    direct: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the CDC feed for `table`, creating it on first use.
    pub fn subscribe_table(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut tables = self.tables.lock().expect("hub lock");
        tables
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to a direct broadcast topic, creating it on first use.
    pub fn subscribe_direct(&self, topic: &str) -> broadcast::Receiver<Value> {
        let mut direct = self.direct.lock().expect("hub lock");
        direct
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Emit a CDC event; a table with no subscribers drops it.
    pub fn emit(&self, event: ChangeEvent) {
        let tables = self.tables.lock().expect("hub lock");
        if let Some(tx) = tables.get(&event.table) {
            let _ = tx.send(event);
        }
    }

    /// Emit a direct payload; a topic with no subscribers drops it.
    pub fn emit_direct(&self, topic: &str, payload: Value) {
        let direct = self.direct.lock().expect("hub lock");
        if let Some(tx) = direct.get(topic) {
            let _ = tx.send(payload);
        }
    }
}
