//! API route handlers for the jobtrail server.

pub mod batch;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod monitor;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Router;
use jobtrail_core::JobResult;
use tokio_stream::{Stream, StreamExt};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create the combined router: API routes under /api, plus /metrics.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/jobs - List jobs (`?router=&state=`)
/// - GET  /api/jobs/{job_id} - Job summary with metadata
/// - GET  /api/jobs/{job_id}/result - Recorded outcome (null until terminal)
/// - GET  /api/jobs/{job_id}/log - Raw persisted SSE log
/// - GET  /api/jobs/{job_id}/monitor - Replay then live tail of the log
/// - POST /api/jobs/{job_id}/pause - Request pause
/// - POST /api/jobs/{job_id}/resume - Request resume
/// - POST /api/jobs/{job_id}/cancel - Request cancel
/// - POST /api/batch/{action} - Run a batch job, streaming its log
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", monitor::router())
        .nest("/api", batch::router())
        .merge(metrics::router())
        .with_state(state)
}

/// Stream pre-encoded SSE blocks as the response body.
///
/// The engine already produces wire-format text (the same bytes it persists),
/// so blocks are forwarded verbatim rather than re-framed.
pub(crate) fn event_stream<S>(stream: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// Run a filesystem-bound engine call off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> JobResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_routes_creation() {
        let state = AppState::new(std::env::temp_dir().join("jobtrail-routes-test"));
        let _router = api_routes(state);
    }

    #[tokio::test]
    async fn test_blocking_maps_engine_errors() {
        let result: ApiResult<()> =
            blocking(|| Err(jobtrail_core::JobError::not_found("jb_1"))).await;
        assert!(matches!(result, Err(ApiError::Job(_))));
    }
}
