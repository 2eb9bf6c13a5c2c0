use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::errors::ImporterError;
use crate::models::job::parse_tag_list;
use crate::models::{JobData, JobId};

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

fn importer_error_response(err: &ImporterError) -> axum::response::Response {
    let (status, code) = match err {
        ImporterError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ImporterError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        ImporterError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    error_response(status, code, &err.to_string()).into_response()
}

fn not_found(id: &str) -> axum::response::Response {
    tracing::warn!("Job not found: '{}'", id);
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        &format!("Job with id '{}' not found", id),
    )
    .into_response()
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// JSON body of `POST /api/jobs`.
#[derive(Debug, Deserialize)]
pub struct NewImport {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Dashboard form. `tags` is one comma separated field.
#[derive(Debug, Deserialize)]
pub struct ImportForm {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: JobId,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let records = state.importer.repo().snapshot();
    tracing::debug!("Listing {} jobs", records.len());
    Json(records)
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewImport>,
) -> impl IntoResponse {
    let data = JobData::new(body.url.trim()).with_tags(body.tags);
    match state.importer.submit(data) {
        Ok(id) => {
            tracing::info!(job_id = %id, "Import submitted over API");
            (StatusCode::ACCEPTED, Json(SubmitResponse { id })).into_response()
        }
        Err(e) => {
            tracing::warn!("Import submission failed: {}", e);
            importer_error_response(&e)
        }
    }
}

/// POST /
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ImportForm>,
) -> impl IntoResponse {
    let tags = form.tags.as_deref().map(parse_tag_list).unwrap_or_default();
    let data = JobData::new(form.url.trim()).with_tags(tags);
    match state.importer.submit(data) {
        Ok(id) => {
            tracing::info!(job_id = %id, "Import submitted from dashboard");
            (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
        }
        Err(e) => {
            tracing::warn!("Dashboard submission failed: {}", e);
            importer_error_response(&e)
        }
    }
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.importer.repo().get(&JobId::new(id.as_str())) {
        Some(record) => Json(record).into_response(),
        None => not_found(&id),
    }
}

/// DELETE /api/jobs/{id}
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.importer.remove(&JobId::new(id.as_str())) {
        tracing::info!(job_id = %id, "Job removed");
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&id)
    }
}

/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.importer.repo().stats())
}
