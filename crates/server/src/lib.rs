// crates/server/src/lib.rs
//! jobtrail server library.
//!
//! Axum HTTP adapter over the file-backed job engine in `jobtrail-core`:
//! job queries, control requests, live monitoring and a generic batch job.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::*;
pub use metrics::{init_metrics, render_metrics, RequestTimer};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Count and time every request by its route template.
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let timer = RequestTimer::new(endpoint);
    let response = next.run(request).await;
    timer.finish(response.status().as_str());
    response
}

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, jobs, monitor, batch) and /metrics
/// - CORS for development (allows any origin)
/// - Request tracing and request metrics
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(middleware::from_fn(track_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
