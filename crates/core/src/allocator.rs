//! Job id allocation and exclusive job file creation.
//!
//! Ids come from a bounded scan of the most recently modified job files
//! (`max + 1`). Two processes can compute the same candidate, so creation
//! goes through an exclusive claim on `<root>/.jb_<n>.claim`: the holder
//! re-checks that no job file already carries the id, creates its file with
//! `create_new`, then drops the claim. A loser moves on to the next candidate.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{JobError, JobResult};
use crate::state::JobState;
use crate::store::{router_dir, scan_job_files, JobFileName, JobId};

/// How many of the newest job files the allocator looks at.
pub const DEFAULT_SCAN_LIMIT: usize = 1000;

/// Next free id based on the `scan_limit` most recently modified job files.
///
/// Very old ids beyond the window are not considered; reuse after a long idle
/// gap is still caught by the existence check in [`create_job_file`].
pub fn generate_job_id(root: &Path, scan_limit: usize) -> JobId {
    let mut files = scan_job_files(root);
    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    let max = files
        .iter()
        .take(scan_limit)
        .map(|e| e.name.job_id.0)
        .max()
        .unwrap_or(0);
    JobId(max + 1)
}

fn claim_path(root: &Path, id: JobId) -> PathBuf {
    root.join(format!(".{id}.claim"))
}

fn id_in_use(root: &Path, id: JobId) -> bool {
    scan_job_files(root).iter().any(|e| e.name.job_id == id)
}

/// A freshly created, empty job file in the `running` state.
#[derive(Debug, Clone)]
pub struct CreatedJobFile {
    pub path: PathBuf,
    pub name: JobFileName,
}

/// Create `<root>/<router>/<name>.running` under a fresh id.
///
/// Retries up to `max_attempts` times on collision; running out is fatal.
pub fn create_job_file(
    root: &Path,
    router: &str,
    action: &str,
    object_id: Option<&str>,
    created: DateTime<Utc>,
    scan_limit: usize,
    max_attempts: usize,
) -> JobResult<CreatedJobFile> {
    let dir = router_dir(root, router);
    fs::create_dir_all(&dir).map_err(|e| JobError::io(&dir, e))?;

    let mut candidate = generate_job_id(root, scan_limit);
    for attempt in 1..=max_attempts.max(1) {
        match try_create(root, &dir, action, object_id, created, candidate)? {
            Some(created) => return Ok(created),
            None => {
                debug!(job_id = %candidate, attempt, "job id collision, retrying");
                let fresh = generate_job_id(root, scan_limit);
                candidate = JobId(fresh.0.max(candidate.0 + 1));
            }
        }
    }

    warn!(root = %root.display(), attempts = max_attempts, "job id allocation exhausted");
    Err(JobError::IdExhausted {
        root: root.to_path_buf(),
        attempts: max_attempts,
    })
}

/// One allocation attempt. `Ok(None)` means "collision, try another id".
fn try_create(
    root: &Path,
    dir: &Path,
    action: &str,
    object_id: Option<&str>,
    created: DateTime<Utc>,
    id: JobId,
) -> JobResult<Option<CreatedJobFile>> {
    let claim = claim_path(root, id);
    match OpenOptions::new().write(true).create_new(true).open(&claim) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(JobError::io(&claim, e)),
    }

    let result = (|| {
        if id_in_use(root, id) {
            return Ok(None);
        }
        let name = JobFileName::new(created, action, id, object_id);
        let path = dir.join(name.file_name(JobState::Running));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(CreatedJobFile { path, name })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(JobError::io(&path, e)),
        }
    })();

    if let Err(e) = fs::remove_file(&claim) {
        warn!(path = %claim.display(), error = %e, "failed to release job id claim");
    }
    result
}
