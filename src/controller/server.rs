//! # HTTP Server
//!
//! Metrics and probe endpoints:
//!
//! - `/metrics` - Prometheus text exposition
//! - `/healthz` - liveness, always OK while the process serves requests
//! - `/readyz` - readiness, OK once the listener is bound and until shutdown

use crate::observability;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for the probe handlers
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

/// Bind the listener and serve until the process exits
///
/// Marks the server ready once the listener is bound.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or serving fails.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

    state.is_ready.store(true, Ordering::Relaxed);
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server terminated")
}

/// Routes for metrics and probes
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics() -> Response {
    match observability::metrics::gather() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    if state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
