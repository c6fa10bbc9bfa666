//! Request-scoped console logging.
//!
//! A [`RequestCounter`] lives in server state (one per process) and hands out
//! numbered [`RequestLog`] contexts. Messages logged through a context go to
//! `tracing` with the request number and router attached, so interleaved
//! jobs stay attributable on the console.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::info;

#[derive(Debug, Default)]
pub struct RequestCounter {
    next: AtomicU64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new numbered request context (numbers start at 1).
    pub fn begin(&self, router: impl Into<String>) -> RequestLog {
        let number = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        RequestLog {
            number,
            router: router.into(),
            started: Instant::now(),
        }
    }

    /// Requests started so far.
    pub fn count(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct RequestLog {
    number: u64,
    router: String,
    started: Instant,
}

impl RequestLog {
    /// A context outside any HTTP request (tests, CLI drivers).
    pub fn detached(router: impl Into<String>) -> Self {
        Self {
            number: 0,
            router: router.into(),
            started: Instant::now(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn router(&self) -> &str {
        &self.router
    }

    pub fn log(&self, message: &str) {
        info!(
            request = self.number,
            router = %self.router,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "{message}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_numbers_requests() {
        let counter = RequestCounter::new();
        assert_eq!(counter.begin("crawler").number(), 1);
        assert_eq!(counter.begin("batch").number(), 2);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_counters_are_independent() {
        let a = RequestCounter::new();
        let b = RequestCounter::new();
        a.begin("x");
        a.begin("x");
        assert_eq!(b.begin("y").number(), 1);
    }

    #[test]
    fn test_detached_context() {
        let ctx = RequestLog::detached("tests");
        assert_eq!(ctx.number(), 0);
        assert_eq!(ctx.router(), "tests");
        ctx.log("does not panic without a subscriber");
    }
}
