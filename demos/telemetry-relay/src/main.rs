//! Telemetry relay for the session's telemetry panel.
//!
//! Run with: cargo run -p telemetry-relay-demo
//!
//! Forwards read requests to an industrial-data API, adding basic auth and
//! accepting self-signed certificates, so callers need neither.
//!
//! Environment:
//! - `RELAY_UPSTREAM_URL` - API base, e.g. `https://pi.example/piwebapi` (required)
//! - `RELAY_ELEMENT_WEB_ID` - element whose attributes are listed (required)
//! - `RELAY_USERNAME` / `RELAY_PASSWORD` - basic auth credentials
//! - `RELAY_PORT` - listen port, default 3001

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone)]
struct RelayConfig {
    port: u16,
    upstream_url: String,
    element_web_id: String,
    username: Option<String>,
    password: Option<String>,
}

impl RelayConfig {
    fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("RELAY_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("RELAY_PORT is not a port number: {port}"))?,
            None => DEFAULT_PORT,
        };
        let upstream_url = lookup("RELAY_UPSTREAM_URL").context("RELAY_UPSTREAM_URL must be set")?;
        let element_web_id =
            lookup("RELAY_ELEMENT_WEB_ID").context("RELAY_ELEMENT_WEB_ID must be set")?;

        Ok(Self {
            port,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            element_web_id,
            username: lookup("RELAY_USERNAME").filter(|u| !u.is_empty()),
            password: lookup("RELAY_PASSWORD"),
        })
    }
}

/// The industrial-data API behind the relay.
struct Upstream {
    client: reqwest::Client,
    config: RelayConfig,
}

impl Upstream {
    fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build upstream client")?;
        Ok(Self { client, config })
    }

    /// GET a JSON document, keeping the upstream status.
    async fn get(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        let url = format!("{}{path}", self.config.upstream_url);
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {path} failed"))?;
        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = response
            .bytes()
            .await
            .context("Failed to read upstream response")?;
        let value = serde_json::from_slice(&body).context("JSON parse error")?;
        Ok((status, value))
    }
}

/// Upstream failure, answered with `500 {"error": message}`.
struct RelayFailure(anyhow::Error);

impl IntoResponse for RelayFailure {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{:#}", self.0) })),
        )
            .into_response()
    }
}

type RelayResult = Result<(StatusCode, Json<Value>), RelayFailure>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let app = router(Arc::new(Upstream::new(config)?));

    tracing::info!("Telemetry relay listening on http://{addr}");
    tracing::info!("Health check: http://{addr}/api/telemetry/health");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(upstream: Arc<Upstream>) -> Router {
    Router::new()
        .route("/api/telemetry/attributes", get(attributes))
        .route("/api/telemetry/value/{web_id}", get(value))
        .route("/api/telemetry/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(upstream)
}

async fn attributes(State(upstream): State<Arc<Upstream>>) -> RelayResult {
    tracing::info!("Fetching telemetry attributes");
    let path = format!("/elements/{}/attributes", upstream.config.element_web_id);
    forward(&upstream, &path).await
}

async fn value(State(upstream): State<Arc<Upstream>>, Path(web_id): Path<String>) -> RelayResult {
    tracing::info!(%web_id, "Fetching telemetry value");
    let path = format!("/streams/{}/value", urlencoding::encode(&web_id));
    forward(&upstream, &path).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "Telemetry relay is running" }))
}

async fn forward(upstream: &Upstream, path: &str) -> RelayResult {
    match upstream.get(path).await {
        Ok((status, body)) => Ok((status, Json(body))),
        Err(e) => {
            tracing::error!("Upstream request failed: {e:#}");
            Err(RelayFailure(e))
        }
    }
}
