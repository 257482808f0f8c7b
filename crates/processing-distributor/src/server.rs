use crate::{distributor::ProcessDistributor, metrics::DistributorMetrics};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct ServerState {
    pub distributor: Arc<ProcessDistributor>,
    pub metrics: Arc<DistributorMetrics>,
}

/// Observability routes of the binary
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    families: usize,
    workers: usize,
    queued_tasks: usize,
}

async fn metrics(State(state): State<ServerState>) -> Response {
    match state.metrics.render() {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!("Could not render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn health_check(State(state): State<ServerState>) -> Json<HealthResponse> {
    let families = state.distributor.worker_manager().get_workers_list();
    Json(HealthResponse {
        status: "healthy".to_string(),
        families: families.len(),
        workers: families.iter().map(|f| f.workers.len()).sum(),
        queued_tasks: families.iter().map(|f| f.queue_size).sum(),
    })
}
