use std::sync::Arc;

use axum::{
    extract::State,
    http::Method,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/env", get(remote_env))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
}

/// The field names are the contract the web client decodes.
#[derive(Serialize)]
struct RemoteEnvResponse {
    #[serde(rename = "remoteUrl")]
    remote_url: String,
    #[serde(rename = "anonKey")]
    anon_key: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Hand clients the remote store coordinates, or 503 so they degrade to
/// their local cache.
async fn remote_env(
    State(state): State<AppState>,
) -> Result<Json<RemoteEnvResponse>, ServerError> {
    let (url, key) = state
        .config
        .remote_env()
        .ok_or(ServerError::RemoteNotConfigured)?;
    Ok(Json(RemoteEnvResponse {
        remote_url: url.to_string(),
        anon_key: key.to_string(),
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state(config: ServerConfig) -> AppState {
        AppState {
            config: Arc::new(config),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_and_version() {
        let app = build_router(state(ServerConfig::default()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn env_endpoint_serves_the_configured_remote() {
        let mut config = ServerConfig::default();
        config.remote_url = Some("https://db.example.com".into());
        config.remote_anon_key = Some("anon-key".into());

        let app = build_router(state(config));
        let response = app
            .oneshot(Request::get("/api/env").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["remoteUrl"], "https://db.example.com");
        assert_eq!(body["anonKey"], "anon-key");
    }

    #[tokio::test]
    async fn env_endpoint_is_unavailable_without_configuration() {
        let app = build_router(state(ServerConfig::default()));
        let response = app
            .oneshot(Request::get("/api/env").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
