//! Fanout Server - WebSocket front end for the fan-out hub
//!
//! Every client that upgrades on the WebSocket path joins one shared hub;
//! whatever a client sends is relayed to all connected clients. The default
//! payload is a JSON drawing event (see [`protocol`]), which makes this a
//! shared-canvas relay out of the box.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod probe;
pub mod protocol;
pub mod transport;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use fanout_hub::{Hub, HubConfig, HubHandle};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::metrics::ServerMetrics;
use crate::transport::WsSender;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle<WsSender>,
    pub transport: Arc<TransportConfig>,
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    /// Start a hub on the current runtime and wrap it for the router.
    pub fn new(hub: HubConfig, transport: TransportConfig) -> Self {
        Self {
            hub: Hub::spawn(hub),
            transport: Arc::new(transport),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }
}

/// Custom span maker that includes a unique request ID for correlation
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(handlers::ws_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then wait for in-flight HTTP requests.
///
/// Upgraded sockets are not tracked by the HTTP server; stop the hub first so
/// they close and the drain can finish.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}
