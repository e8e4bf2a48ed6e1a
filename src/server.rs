//! Operator endpoints: `/health` and `/metrics`

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::observability::Metrics;
use crate::queue::{DocumentStore, TaskDispatcher};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(address: SocketAddr, state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Operator endpoint listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = |healthy: bool| {
        let label = if healthy { "healthy" } else { "unhealthy" };
        label.to_string()
    };

    let mut components = BTreeMap::new();
    components.insert("queue".to_string(), status(state.store.authenticated()));
    components.insert("workers".to_string(), status(state.dispatcher.health_check()));

    let all_healthy = components.values().all(|s| s == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: status(all_healthy),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
