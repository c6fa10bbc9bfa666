// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobtrail_core::JobError;
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::Job(job_err) => {
                let (status, error_msg) = match job_err {
                    JobError::NotFound { job_id } => {
                        tracing::warn!(job_id = %job_id, "Job not found");
                        (StatusCode::NOT_FOUND, "Job not found")
                    }
                    JobError::FileNotFound { path } => {
                        tracing::warn!(path = %path.display(), "Job file not found");
                        (StatusCode::NOT_FOUND, "Job file not found")
                    }
                    JobError::InvalidJobId(raw) => {
                        tracing::warn!(job_id = %raw, "Invalid job id");
                        (StatusCode::BAD_REQUEST, "Invalid job id")
                    }
                    JobError::PermissionDenied { path } => {
                        tracing::error!(path = %path.display(), "Permission denied");
                        (StatusCode::FORBIDDEN, "Permission denied")
                    }
                    JobError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error accessing job store")
                    }
                    JobError::IdExhausted { root, attempts } => {
                        tracing::error!(root = %root.display(), attempts, "Job id allocation exhausted");
                        (StatusCode::SERVICE_UNAVAILABLE, "Could not allocate a job id")
                    }
                    other => {
                        tracing::error!(error = %other, "Job engine error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Job engine error")
                    }
                };
                (
                    status,
                    ErrorResponse::with_details(error_msg, job_err.to_string()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
