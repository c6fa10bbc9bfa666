// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use crate::state::JobState;

/// Errors raised by the job engine.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("Job file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied accessing job file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not allocate a job id after {attempts} attempts in {root}")]
    IdExhausted { root: PathBuf, attempts: usize },

    #[error("Illegal state transition {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Job {job_id} already emitted its end block")]
    AlreadyEnded { job_id: String },

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Failed to encode job metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

impl JobError {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound {
            job_id: job_id.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// True for the "no such job / no such file" family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::FileNotFound { .. })
    }
}

pub type JobResult<T> = Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = JobError::not_found("jb_7");
        assert!(err.to_string().contains("jb_7"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = JobError::io("/jobs/x.running", io_err);
        assert!(matches!(err, JobError::FileNotFound { .. }));
        assert!(err.is_not_found());

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = JobError::io("/jobs/x.running", io_err);
        assert!(matches!(err, JobError::PermissionDenied { .. }));
    }

    #[test]
    fn test_io_other() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        let err = JobError::io("/jobs/x.running", io_err);
        assert!(matches!(err, JobError::Io { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transition_display() {
        let err = JobError::InvalidTransition {
            from: JobState::Completed,
            to: JobState::Running,
        };
        assert_eq!(err.to_string(), "Illegal state transition completed -> running");
    }
}
