//! `/healthz`, `/readyz`, and `/metrics` endpoints. Bound to
//! `RuntimeConfig::metrics_bind_address` and spawned alongside the
//! controller loop in `main.rs`, as an independent task next to the
//! reconciler.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use tracing::info;

use crate::controller::ControllerState;
use crate::error::{Error, Result};

pub async fn run_server(state: Arc<ControllerState>) -> Result<()> {
    let addr = state.config.metrics_bind_address.clone();
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/metrics", get(metrics));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;
    info!("metrics server listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Config(format!("metrics server error: {e}")))
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn metrics() -> impl IntoResponse {
    let mut buffer = String::new();
    match encode(&mut buffer, &crate::metrics::REGISTRY) {
        Ok(()) => (StatusCode::OK, buffer),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
