//! HTTP backend for the hosted store.
//!
//! Table operations go over the service's REST surface
//! (`{url}/rest/v1/{table}` with `apikey` headers and `Prefer` write
//! options); realtime traffic goes through the websocket task in
//! [`crate::socket`].  Every operation is a single attempt; transport
//! failures surface as [`RemoteError::Unreachable`] and callers fall
//! back to the local cache.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::filter::{Filter, Order};
use crate::hub::Hub;
use crate::socket::{spawn_socket, SocketCommand};
use crate::store::{ChangeEvent, RemoteStore};

/// Remote store client speaking REST + realtime websocket.
pub struct HttpRemote {
    client: reqwest::Client,
    config: RemoteConfig,
    hub: Arc<Hub>,
    socket: mpsc::Sender<SocketCommand>,
}

impl HttpRemote {
    /// Build a client and spawn its realtime socket task.
    pub fn connect(config: RemoteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.anon_key)
            .map_err(|_| RemoteError::NotConfigured)?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
            .map_err(|_| RemoteError::NotConfigured)?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let hub = Arc::new(Hub::new());
        let socket = spawn_socket(config.clone(), Arc::clone(&hub));

        Ok(Self {
            client,
            config,
            hub,
            socket,
        })
    }

    fn query_for(filter: Option<&Filter>, order: Option<&Order>, limit: Option<u32>) -> Vec<(String, String)> {
        let mut pairs = filter.map(Filter::to_query).unwrap_or_default();
        if let Some(order) = order {
            pairs.push(order.to_query());
        }
        if let Some(limit) = limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// Map a non-success response to the error taxonomy.
    async fn expect_ok(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(RemoteError::Conflict(body));
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>> {
        let resp = self
            .client
            .get(self.config.rest_url(table))
            .query(&Self::query_for(filter, order, limit))
            .send()
            .await?;
        let rows = Self::expect_ok(resp).await?.json().await?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.config.rest_url(table))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let mut rows: Vec<Value> = Self::expect_ok(resp).await?.json().await?;
        Ok(if rows.is_empty() { row } else { rows.remove(0) })
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        let resp = self
            .client
            .patch(self.config.rest_url(table))
            .query(&filter.to_query())
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let rows = Self::expect_ok(resp).await?.json().await?;
        Ok(rows)
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<Value> {
        let resp = self
            .client
            .post(self.config.rest_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header(
                "Prefer",
                "resolution=merge-duplicates,return=representation",
            )
            .json(&row)
            .send()
            .await?;
        let mut rows: Vec<Value> = Self::expect_ok(resp).await?.json().await?;
        Ok(if rows.is_empty() { row } else { rows.remove(0) })
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64> {
        let resp = self
            .client
            .delete(self.config.rest_url(table))
            .query(&filter.to_query())
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<Value> = Self::expect_ok(resp).await?.json().await?;
        Ok(rows.len() as u64)
    }

    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        // Best-effort join; a full command queue just means the topic is
        // already being set up.
        let _ = self.socket.try_send(SocketCommand::JoinTable {
            table: table.to_string(),
        });
        self.hub.subscribe_table(table)
    }

    fn subscribe_direct(&self, topic: &str) -> broadcast::Receiver<Value> {
        let _ = self.socket.try_send(SocketCommand::JoinDirect {
            topic: topic.to_string(),
        });
        self.hub.subscribe_direct(topic)
    }

    async fn publish_direct(&self, topic: &str, payload: Value) -> Result<()> {
        self.socket
            .send(SocketCommand::Broadcast {
                topic: topic.to_string(),
                payload,
            })
            .await
            .map_err(|_| RemoteError::ChannelClosed)
    }
}
