//! Fire-and-forget control requests.
//!
//! A request is an empty sentinel file next to the job file, sharing its
//! stem. The job's own writer deletes it when it next reaches a checkpoint,
//! or drops it unread when the job finishes first. There is no other
//! acknowledgement than the job's log stream.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{JobError, JobResult};
use crate::state::ControlRequest;
use crate::store::{control_path, locate_job_file, JobId};

/// Drop a sentinel for `request` next to `job_id`'s file.
///
/// `Ok(false)` when an identical request is already pending or the job has
/// already finished (nobody would ever consume it).
pub fn request_control(root: &Path, job_id: &str, request: ControlRequest) -> JobResult<bool> {
    let id: JobId = job_id.parse()?;
    let entry = locate_job_file(root, id).ok_or_else(|| JobError::not_found(job_id))?;

    if entry.state.is_terminal() {
        debug!(job_id, request = %request, state = %entry.state, "control request for finished job ignored");
        return Ok(false);
    }

    let sentinel = control_path(&entry.path, request);
    match OpenOptions::new().write(true).create_new(true).open(&sentinel) {
        Ok(_) => {
            info!(job_id, request = %request, "control request queued");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(job_id, request = %request, "control request already pending");
            Ok(false)
        }
        Err(e) => Err(JobError::io(sentinel, e)),
    }
}

pub fn request_pause(root: &Path, job_id: &str) -> JobResult<bool> {
    request_control(root, job_id, ControlRequest::Pause)
}

pub fn request_resume(root: &Path, job_id: &str) -> JobResult<bool> {
    request_control(root, job_id, ControlRequest::Resume)
}

pub fn request_cancel(root: &Path, job_id: &str) -> JobResult<bool> {
    request_control(root, job_id, ControlRequest::Cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn job(root: &Path, state: &str) -> std::path::PathBuf {
        let dir = root.join("crawler");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("2025-01-15_14-20-30_[crawl]_[jb_3]_[site].{state}"));
        fs::write(&path, "").unwrap();
        path
    }

    fn sentinels(root: &Path) -> Vec<String> {
        fs::read_dir(root.join("crawler"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with("_requested"))
            .collect()
    }

    #[test]
    fn test_duplicate_pause_creates_one_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        job(dir.path(), "running");
        assert!(request_pause(dir.path(), "jb_3").unwrap());
        assert!(!request_pause(dir.path(), "jb_3").unwrap());
        assert_eq!(
            sentinels(dir.path()),
            vec!["2025-01-15_14-20-30_[crawl]_[jb_3]_[site].pause_requested".to_string()]
        );
    }

    #[test]
    fn test_resume_targets_paused_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = job(dir.path(), "paused");
        assert!(request_resume(dir.path(), "jb_3").unwrap());
        assert!(control_path(&path, ControlRequest::Resume).exists());
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = request_cancel(dir.path(), "jb_3").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_finished_job_rejects_requests() {
        let dir = tempfile::tempdir().unwrap();
        job(dir.path(), "completed");
        assert!(!request_cancel(dir.path(), "jb_3").unwrap());
        assert!(sentinels(dir.path()).is_empty());
    }
}
