// src/server/metrics_server.rs

use crate::core::BrokerState;
use crate::core::metrics::gather_metrics;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Serves the same snapshot as `BROKER:STATUS` on /status.
async fn status_handler(state: Arc<BrokerState>) -> impl IntoResponse {
    Json(state.snapshot())
}

/// Runs a simple HTTP server exposing Prometheus metrics on /metrics.
pub async fn run_metrics_server(state: Arc<BrokerState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let host = state.config.metrics.host.clone();
    let port = state.config.metrics.port;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/status", get(move || status_handler(state.clone())));

    let listener = match tokio::net::TcpListener::bind((host.as_str(), port)).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on {}:{}: {}", host, port, e);
            return;
        }
    };
    info!(
        "Prometheus metrics server listening on http://{}:{}/metrics",
        host, port
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await;
    if let Err(e) = served {
        error!("Metrics server failed: {}", e);
    }
}
