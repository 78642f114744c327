//! # concord-server
//!
//! Small HTTP front for a Concord instance.  It does not proxy chat
//! traffic; clients talk to the hosted data service directly.  The
//! server's job is handing out that service's coordinates (`/api/env`)
//! plus health and instance metadata.

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,concord_server=debug")),
        )
        .init();

    info!("Starting Concord server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        remote_configured = config.remote_env().is_some(),
        "Loaded configuration"
    );

    let http_addr = config.http_addr;
    let app_state = AppState {
        config: Arc::new(config),
    };

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
