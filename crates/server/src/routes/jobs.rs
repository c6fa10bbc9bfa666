// crates/server/src/routes/jobs.rs
//! Job queries and control requests.
//!
//! - GET  /jobs: list jobs, newest first
//! - GET  /jobs/{job_id}: one job with its metadata
//! - GET  /jobs/{job_id}/result: recorded outcome
//! - GET  /jobs/{job_id}/log: raw persisted SSE text
//! - POST /jobs/{job_id}/{pause,resume,cancel}: drop a control sentinel

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use jobtrail_core::metadata::format_utc;
use jobtrail_core::{
    find_job_by_id, list_jobs, read_job_log, read_job_result, request_control, ControlRequest,
    JobMetadata, JobOutcome, JobRecord, JobState,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_control;
use crate::routes::blocking;
use crate::state::AppState;

/// A job as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct JobSummary {
    pub job_id: String,
    pub router: String,
    pub action: String,
    pub object_id: Option<String>,
    pub state: JobState,
    pub file_name: String,
    pub modified_utc: String,
    pub metadata: Option<JobMetadata>,
}

impl From<JobRecord> for JobSummary {
    fn from(record: JobRecord) -> Self {
        let file_name = record
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            job_id: record.job_id,
            router: record.router,
            action: record.action,
            object_id: record.object_id,
            state: record.state,
            file_name,
            modified_utc: format_utc(DateTime::<Utc>::from(record.modified)),
            metadata: record.metadata,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub router: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct JobResultResponse {
    pub job_id: String,
    pub result: Option<JobOutcome>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ControlResponse {
    pub job_id: String,
    pub action: ControlRequest,
    /// False when the same request was already pending or the job has ended.
    pub requested: bool,
}

/// GET /api/jobs: List jobs, optionally filtered by router and state.
async fn list_jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    let state_filter = query
        .state
        .as_deref()
        .map(str::parse::<JobState>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let root = state.jobs_root.clone();
    let router_filter = query.router;

    let records =
        blocking(move || list_jobs(&root, router_filter.as_deref(), state_filter)).await?;
    Ok(Json(records.into_iter().map(JobSummary::from).collect()))
}

/// GET /api/jobs/{job_id}: One job with its metadata.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSummary>> {
    let root = state.jobs_root.clone();
    let id = job_id.clone();
    match blocking(move || find_job_by_id(&root, &id)).await? {
        Some(record) => Ok(Json(record.into())),
        None => Err(ApiError::JobNotFound(job_id)),
    }
}

/// GET /api/jobs/{job_id}/result: Outcome, `null` while the job is live.
async fn get_job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResultResponse>> {
    let root = state.jobs_root.clone();
    let id = job_id.clone();
    let result = blocking(move || read_job_result(&root, &id)).await?;
    Ok(Json(JobResultResponse { job_id, result }))
}

/// GET /api/jobs/{job_id}/log: The persisted log, byte for byte.
async fn get_job_log(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let root = state.jobs_root.clone();
    let bytes = blocking(move || read_job_log(&root, &job_id)).await?;
    Ok(([(header::CONTENT_TYPE, "text/event-stream")], bytes).into_response())
}

async fn control(
    state: &AppState,
    job_id: String,
    action: ControlRequest,
) -> ApiResult<Json<ControlResponse>> {
    let root = state.jobs_root.clone();
    let id = job_id.clone();
    let requested = blocking(move || request_control(&root, &id, action)).await?;
    record_control(action.as_str(), requested);
    tracing::info!(job_id = %job_id, action = %action, requested, "Control request");
    Ok(Json(ControlResponse {
        job_id,
        action,
        requested,
    }))
}

/// POST /api/jobs/{job_id}/pause
async fn pause_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ControlResponse>> {
    control(&state, job_id, ControlRequest::Pause).await
}

/// POST /api/jobs/{job_id}/resume
async fn resume_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ControlResponse>> {
    control(&state, job_id, ControlRequest::Resume).await
}

/// POST /api/jobs/{job_id}/cancel
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ControlResponse>> {
    control(&state, job_id, ControlRequest::Cancel).await
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/result", get(get_job_result))
        .route("/jobs/{job_id}/log", get(get_job_log))
        .route("/jobs/{job_id}/pause", post(pause_job))
        .route("/jobs/{job_id}/resume", post(resume_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
}
