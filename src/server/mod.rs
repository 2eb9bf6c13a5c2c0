pub mod assets;
pub mod health;
pub mod routes;
pub mod sse;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::daemon::events::JobEvent;
use crate::daemon::Importer;
use crate::models::ImporterConfig;

/// Shared application state for the Axum server.
pub struct AppState {
    pub importer: Arc<Importer>,
    pub event_tx: broadcast::Sender<JobEvent>,
    pub config: Arc<ImporterConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(importer: Arc<Importer>) -> Self {
        Self {
            event_tx: importer.events().clone(),
            config: Arc::clone(importer.config()),
            importer,
            start_time: Instant::now(),
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/",
            get(assets::serve_embedded).post(routes::submit_form),
        )
        .route("/health", get(health::health_check))
        .route("/api/jobs", get(routes::list_jobs).post(routes::create_job))
        .route(
            "/api/jobs/{id}",
            get(routes::get_job).delete(routes::delete_job),
        )
        .route("/api/stats", get(routes::stats))
        .route("/api/events", get(sse::sse_handler))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .fallback(assets::serve_embedded)
}
