//! Remote endpoint configuration.
//!
//! Clients learn where the remote store lives either from the
//! environment or from the concord-server `/api/env` endpoint, which
//! exposes the connection URL and public (anon) key at runtime.

use serde::Deserialize;

use crate::error::{RemoteError, Result};

/// Connection settings for the hosted store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the service, e.g. `https://abc.example.co`.
    pub url: String,
    /// Public API key sent as `apikey` / bearer token.
    pub anon_key: String,
}

/// Body of the server's `/api/env` endpoint.
#[derive(Debug, Deserialize)]
struct EnvResponse {
    #[serde(rename = "remoteUrl")]
    remote_url: Option<String>,
    #[serde(rename = "anonKey")]
    anon_key: Option<String>,
}

impl RemoteConfig {
    /// Read `REMOTE_URL` / `REMOTE_ANON_KEY` from the environment.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("REMOTE_URL").map_err(|_| RemoteError::NotConfigured)?;
        let anon_key = std::env::var("REMOTE_ANON_KEY").map_err(|_| RemoteError::NotConfigured)?;
        Ok(Self { url, anon_key })
    }

    /// Fetch the configuration from a running concord-server instance.
    ///
    /// A reachable server with no remote configured yields
    /// [`RemoteError::NotConfigured`]; callers degrade to local-only
    /// operation.
    pub async fn fetch(config_endpoint: &str) -> Result<Self> {
        let resp = reqwest::get(config_endpoint).await?;
        if !resp.status().is_success() {
            return Err(RemoteError::NotConfigured);
        }
        let env: EnvResponse = resp.json().await?;
        match (env.remote_url, env.anon_key) {
            (Some(url), Some(anon_key)) => Ok(Self { url, anon_key }),
            _ => Err(RemoteError::NotConfigured),
        }
    }

    /// REST endpoint for a table.
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url.trim_end_matches('/'))
    }

    /// Realtime websocket endpoint.
    pub fn ws_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws}/realtime/v1/websocket?apikey={}", self.anon_key)
    }
}
