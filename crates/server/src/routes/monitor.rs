//! Live job monitor.
//!
//! `GET /jobs/{job_id}/monitor` replays the job's persisted log from the
//! start, then tails it, forwarding each complete block as it lands. The
//! stream ends once the job is terminal and its file has been drained, so
//! a monitor on a finished job is a plain replay.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use jobtrail_core::JobLogFollower;

use crate::error::ApiResult;
use crate::routes::{blocking, event_stream};
use crate::state::AppState;

/// GET /api/jobs/{job_id}/monitor
async fn monitor_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let root = state.jobs_root.clone();
    let poll = state.options.poll_interval;
    let mut follower = blocking(move || JobLogFollower::open(&root, &job_id)).await?;

    let stream = async_stream::stream! {
        loop {
            match follower.read_new_blocks().await {
                Ok(text) if !text.is_empty() => yield text,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %follower.path().display(), error = %e, "Monitor lost the job log");
                    break;
                }
            }
            match follower.is_drained().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %follower.path().display(), error = %e, "Monitor lost the job log");
                    break;
                }
            }
            tokio::time::sleep(poll).await;
        }
        tracing::debug!(path = %follower.path().display(), state = %follower.state(), "Monitor finished");
    };

    Ok(event_stream(stream))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs/{job_id}/monitor", get(monitor_job))
}
