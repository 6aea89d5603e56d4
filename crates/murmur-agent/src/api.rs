//! Job endpoint handlers.

use crate::worker::{JobSummary, StartedJob, TurnOutcome, Worker, WorkerError};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use murmur_voice::VoiceError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::EmptyRoom => ApiError::BadRequest(e.to_string()),
            WorkerError::NotFound(_) => ApiError::NotFound(e.to_string()),
            WorkerError::AlreadyRunning(_) => ApiError::Conflict(e.to_string()),
            WorkerError::Voice(VoiceError::Config(msg)) => ApiError::BadRequest(msg),
            WorkerError::Voice(
                inner @ (VoiceError::Mcp(_) | VoiceError::Http(_) | VoiceError::RoomService(_)),
            ) => ApiError::BadGateway(inner.to_string()),
            WorkerError::Voice(inner) => ApiError::InternalServerError(inner.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartJobRequest {
    pub room: String,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

/// `POST /jobs`
pub async fn start_job_handler(
    Extension(worker): Extension<Arc<Worker>>,
    Json(body): Json<StartJobRequest>,
) -> Result<(StatusCode, Json<StartedJob>), ApiError> {
    let started = worker.start_job(&body.room).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// `GET /jobs`
pub async fn list_jobs_handler(Extension(worker): Extension<Arc<Worker>>) -> Json<Vec<JobSummary>> {
    Json(worker.jobs())
}

/// `DELETE /jobs/{room}`
pub async fn stop_job_handler(
    Extension(worker): Extension<Arc<Worker>>,
    Path(room): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    Ok(Json(worker.stop_job(&room).await?))
}

/// `POST /jobs/{room}/turns`
///
/// Responds 200 with the delivered fragments, or 502 with whatever was
/// delivered before the backend failed.
pub async fn turn_handler(
    Extension(worker): Extension<Arc<Worker>>,
    Path(room): Path<String>,
    Json(body): Json<TurnRequest>,
) -> Result<(StatusCode, Json<TurnOutcome>), ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("turn text is empty".to_string()));
    }
    let outcome = worker.run_turn(&room, &body.text).await?;
    let status = if outcome.error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}
