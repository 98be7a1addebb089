use axum::{
    Json,
    extract::{State, WebSocketUpgrade, ws::WebSocket},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fanout_hub::accept;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::metrics::HealthStatus;
use crate::transport::ws_connection;

/// WebSocket endpoint - every upgraded client joins the shared hub
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.hub.is_closed() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let limit = state.transport.max_message_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    state.metrics.connection_opened();

    let conn = ws_connection(socket, &state.transport, state.metrics.clone());
    let id = conn.id();
    info!(conn = %id, "Client connected");

    match accept(&state.hub, conn).await {
        Ok(reader) => match reader.await {
            Ok(exit) => debug!(conn = %id, ?exit, "Reader finished"),
            Err(e) => warn!(conn = %id, "Reader task failed: {}", e),
        },
        Err(e) => {
            state.metrics.registration_failed();
            warn!(conn = %id, error = %e, code = e.error_code(), "Registration failed");
        }
    }

    state.metrics.connection_closed();
    info!(conn = %id, "Client disconnected");
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let connections = state.metrics.active_connections.load(Ordering::Relaxed);
    let uptime_secs = state.metrics.uptime_secs();

    match state.hub.stats().await {
        Ok(stats) => Json(HealthStatus {
            status: "healthy".to_string(),
            connections,
            members: stats.members as u64,
            uptime_secs,
        })
        .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus {
                status: "shutting_down".to_string(),
                connections,
                members: 0,
                uptime_secs,
            }),
        )
            .into_response(),
    }
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Metrics endpoint - transport counters plus hub counters
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub.stats().await.ok();
    Json(state.metrics.snapshot(hub))
}
