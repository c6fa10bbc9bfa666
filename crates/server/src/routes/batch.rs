//! Generic batch jobs.
//!
//! `POST /batch/{action}` starts a job under the `batch` router and streams
//! its log back as the response body. Each item is "processed" by waiting
//! `item_delay_ms`, which makes the endpoint a convenient way to exercise
//! pause, resume and cancel against a real job.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use jobtrail_core::{run_items, StreamingJobWriter};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::routes::{blocking, event_stream};
use crate::state::AppState;

pub const BATCH_ROUTER: &str = "batch";

/// Response header carrying the id of the job behind the stream.
pub const JOB_ID_HEADER: &str = "x-job-id";

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<String>,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub item_delay_ms: u64,
}

/// POST /api/batch/{action}
async fn run_batch(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Response> {
    let ctx = state.requests.begin(BATCH_ROUTER);
    let root = state.jobs_root.clone();
    let options = state.options.clone();
    let source_url = request
        .source_url
        .unwrap_or_else(|| format!("/api/batch/{action}"));
    let object_id = request.object_id;

    let writer = blocking(move || {
        StreamingJobWriter::create(
            &root,
            BATCH_ROUTER,
            &action,
            object_id.as_deref(),
            &source_url,
            options,
        )
    })
    .await?;
    let job_id = writer.job_id();
    ctx.log(&format!(
        "Started {} with {} items, monitor at {}",
        job_id,
        request.items.len(),
        writer.monitor_url()
    ));

    let delay = Duration::from_millis(request.item_delay_ms);
    let stream = run_items(writer, ctx, request.items, move |_item: String| async move {
        tokio::time::sleep(delay).await;
        Ok(())
    });

    let mut response = event_stream(stream);
    let header = HeaderValue::from_str(&job_id)
        .map_err(|e| ApiError::Internal(format!("job id is not a valid header: {e}")))?;
    response.headers_mut().insert(JOB_ID_HEADER, header);
    Ok(response)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/batch/{action}", post(run_batch))
}
