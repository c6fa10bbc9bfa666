// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use jobtrail_core::{JobOptions, RequestCounter};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Root of the job store. One subdirectory per router.
    pub jobs_root: PathBuf,
    /// Tuning handed to every job writer created by this server.
    pub options: JobOptions,
    /// Numbers job-producing requests for console attribution.
    pub requests: RequestCounter,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(jobs_root: impl Into<PathBuf>) -> Arc<Self> {
        Self::with_options(jobs_root, JobOptions::default())
    }

    pub fn with_options(jobs_root: impl Into<PathBuf>, options: JobOptions) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs_root: jobs_root.into(),
            options,
            requests: RequestCounter::new(),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_new() {
        let state = AppState::new("/tmp/jobs");
        assert!(state.uptime_secs() < 1);
        assert_eq!(state.jobs_root, PathBuf::from("/tmp/jobs"));
        assert_eq!(state.requests.count(), 0);
    }

    #[test]
    fn test_request_numbers_are_per_state() {
        let a = AppState::new("/tmp/a");
        let b = AppState::new("/tmp/b");
        assert_eq!(a.requests.begin("crawler").number(), 1);
        assert_eq!(a.requests.begin("crawler").number(), 2);
        assert_eq!(b.requests.begin("crawler").number(), 1);
    }
}
