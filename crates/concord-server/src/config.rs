//! Server configuration loaded from environment variables.
//!
//! Everything has a default so the server starts with zero configuration
//! for local development; without `REMOTE_URL` the `/api/env` endpoint
//! reports the remote as unconfigured and clients stay on their local
//! cache.

use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Base URL of the hosted data service handed to clients.
    /// Env: `REMOTE_URL`
    /// Default: unset.
    pub remote_url: Option<String>,

    /// Public API key for the hosted data service.
    /// Env: `REMOTE_ANON_KEY`
    /// Default: unset.
    pub remote_anon_key: Option<String>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Concord"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            remote_url: None,
            remote_anon_key: None,
            instance_name: "Concord".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(url) = std::env::var("REMOTE_URL") {
            if !url.is_empty() {
                config.remote_url = Some(url);
            }
        }

        if let Ok(key) = std::env::var("REMOTE_ANON_KEY") {
            if !key.is_empty() {
                config.remote_anon_key = Some(key);
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        config
    }

    /// Both remote settings, when the instance is fully configured.
    pub fn remote_env(&self) -> Option<(&str, &str)> {
        match (&self.remote_url, &self.remote_anon_key) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }
}
