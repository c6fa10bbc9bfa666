//! Application metrics for Prometheus monitoring.
//!
//! Job lifecycle counters (`jobs_started_total`, `jobs_finished_total`) are
//! recorded by the engine itself; this module installs the recorder, adds
//! the HTTP-side metrics and renders `/metrics`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("jobs_started_total", "Jobs created, by router");
    describe_counter!(
        "jobs_finished_total",
        "Jobs that reached a terminal state, by router and state"
    );
    describe_counter!(
        "job_control_requests_total",
        "Pause/resume/cancel requests, by action and whether a sentinel was written"
    );
    describe_counter!("http_requests_total", "Total number of API requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "Duration of API requests in seconds"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a completed API request.
pub fn record_request(endpoint: &str, status: &str, duration: Duration) {
    counter!("http_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("http_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

/// Record a control request and whether it produced a new sentinel.
pub fn record_control(action: &str, accepted: bool) {
    counter!(
        "job_control_requests_total",
        "action" => action.to_string(),
        "accepted" => accepted.to_string()
    )
    .increment(1);
}

/// Helper for timing requests.
///
/// Usage:
/// ```ignore
/// let timer = RequestTimer::new("/api/jobs");
/// // ... do work ...
/// timer.finish(response.status().as_str());
/// ```
pub struct RequestTimer {
    endpoint: String,
    start: Instant,
}

impl RequestTimer {
    /// Create a new request timer for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            start: Instant::now(),
        }
    }

    /// Finish timing with a successful status.
    pub fn finish_ok(self) {
        record_request(&self.endpoint, "200", self.start.elapsed());
    }

    /// Finish timing with a custom status string.
    pub fn finish(self, status: &str) {
        record_request(&self.endpoint, status, self.start.elapsed());
    }
}
