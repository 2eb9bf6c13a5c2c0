use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub workers: usize,
    pub total_jobs: usize,
    pub pending_handoffs: usize,
    pub version: String,
    pub work_dir: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Health check");

    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        workers: state.config.parallel_workers,
        total_jobs: state.importer.repo().len(),
        pending_handoffs: state.importer.queue().pending_handoffs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        work_dir: state.config.work_dir().display().to_string(),
    };

    (StatusCode::OK, Json(response))
}
