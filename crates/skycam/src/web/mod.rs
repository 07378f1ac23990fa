//! Web layer: axum HTTP endpoints plus the two WebSocket upgrade paths.
//!
//! - `WS /camera` — the producer endpoint (one authoritative camera)
//! - `WS /viewer` — consumer endpoints (any number)
//! - `GET /health` — liveness probe, plain "OK"
//! - `GET /firmware` — current firmware descriptor as JSON
//! - `GET /api/status` — relay status and traffic counters
//! - `/` — optional static operator UI, optionally behind basic auth

pub mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::validate_request::ValidateRequestHeaderLayer;
use tracing::info;

use crate::firmware::FirmwareDescriptor;
use crate::relay::RelayHub;

/// Settings for the web layer.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: SocketAddr,
    /// Directory with the operator UI build. None disables static serving.
    pub ui_path: Option<PathBuf>,
    /// Basic-auth credentials gating the UI. The API and WebSocket
    /// endpoints are never gated here.
    pub ui_auth: Option<(String, String)>,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
}

struct WebState {
    hub: RelayHub,
    start_time: Instant,
    outbound_buffer: usize,
}

/// Build the application router. Exposed separately from [`start`] so tests
/// can serve it on their own listener.
pub fn app(hub: RelayHub, config: &WebConfig) -> Router {
    let state = Arc::new(WebState {
        hub,
        start_time: Instant::now(),
        outbound_buffer: config.outbound_buffer,
    });

    let mut app = Router::new()
        .route("/camera", get(camera_upgrade))
        .route("/viewer", get(viewer_upgrade))
        .route("/health", get(health))
        .route("/firmware", get(firmware))
        .route("/api/status", get(api_status))
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(ref path) = config.ui_path {
        if path.exists() {
            info!("Serving UI from {:?}", path);
            let serve = ServeDir::new(path).append_index_html_on_directories(true);
            let ui = Router::new().fallback_service(serve);
            let ui = match config.ui_auth {
                Some((ref user, ref pass)) => {
                    info!("UI gated by basic auth");
                    ui.layer(ValidateRequestHeaderLayer::basic(user, pass))
                }
                None => ui,
            };
            app = app.fallback_service(ui);
        } else {
            tracing::warn!(
                "UI path {:?} does not exist, skipping static file serving",
                path
            );
        }
    }

    app
}

/// Bind and serve until the task is cancelled or the listener fails.
pub async fn start(hub: RelayHub, config: WebConfig) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .context(format!("Failed to bind to {}", config.bind))?;

    info!("Web server listening on http://{}", config.bind);

    axum::serve(listener, app(hub, &config))
        .await
        .context("Web server error")
}

async fn camera_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebState>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    let buffer = state.outbound_buffer;
    ws.on_upgrade(move |socket| ws::handle_camera_socket(socket, hub, buffer))
}

async fn viewer_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebState>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    let buffer = state.outbound_buffer;
    ws.on_upgrade(move |socket| ws::handle_viewer_socket(socket, hub, buffer))
}

async fn health() -> &'static str {
    "OK"
}

async fn firmware(State(state): State<Arc<WebState>>) -> Json<FirmwareDescriptor> {
    Json(state.hub.firmware().await)
}

async fn api_status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let stats = state.hub.stats().await;
    let session = state.hub.camera_session().await;

    Json(serde_json::json!({
        "camera_connected": session.connected,
        "camera_version": session.firmware_version,
        "streaming": session.streaming,
        "resolution": session.resolution,
        "viewers": stats.viewers_connected,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "frames_received": stats.frames_received,
        "frames_relayed": stats.frames_relayed,
        "frames_dropped": stats.frames_dropped,
    }))
}
