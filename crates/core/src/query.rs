//! Read-only job lookups by directory scan.
//!
//! There is no index: every query walks `<root>/<router>/` and parses file
//! names, then (when metadata is needed) the `start_json`/`end_json` blocks.
//! A job file may be renamed between the scan and the read; reads retry the
//! lookup a few times before reporting the job as gone.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{JobError, JobResult};
use crate::metadata::{JobMetadata, JobOutcome};
use crate::sse::{parse_events, EventKind};
use crate::state::JobState;
use crate::store::{locate_job_file, scan_job_files, JobFileEntry, JobId};

const RENAME_RETRIES: usize = 3;

/// A job as seen on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub router: String,
    pub action: String,
    pub object_id: Option<String>,
    /// State from the file extension; authoritative over `metadata.state`.
    pub state: JobState,
    pub path: PathBuf,
    pub modified: SystemTime,
    /// `None` when no start/end block could be decoded.
    pub metadata: Option<JobMetadata>,
}

/// Rebuild metadata from raw log content. The end block wins over the start
/// block; undecodable blocks are skipped.
pub fn metadata_from_log(content: &str) -> Option<JobMetadata> {
    let events = parse_events(content);
    let end = events
        .iter()
        .rev()
        .filter(|e| e.kind == EventKind::EndJson)
        .find_map(JobMetadata::from_event);
    end.or_else(|| {
        events
            .iter()
            .filter(|e| e.kind == EventKind::StartJson)
            .find_map(JobMetadata::from_event)
    })
}

fn record_from_entry(entry: JobFileEntry, content: &str) -> JobRecord {
    JobRecord {
        job_id: entry.name.job_id.to_string(),
        router: entry.router,
        action: entry.name.action,
        object_id: entry.name.object_id,
        state: entry.state,
        path: entry.path,
        modified: entry.modified,
        metadata: metadata_from_log(content),
    }
}

/// Read a located job file, re-locating it if a rename got in the way.
fn read_located(root: &Path, job_id: JobId) -> JobResult<Option<(JobFileEntry, Vec<u8>)>> {
    for _ in 0..RENAME_RETRIES {
        let Some(entry) = locate_job_file(root, job_id) else {
            return Ok(None);
        };
        match std::fs::read(&entry.path) {
            Ok(bytes) => return Ok(Some((entry, bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(job_id = %job_id, "job file moved during read, retrying");
            }
            Err(e) => return Err(JobError::io(&entry.path, e)),
        }
    }
    Ok(None)
}

/// Find one job by its exact id (`jb_4` never matches `jb_42`).
pub fn find_job_by_id(root: &Path, job_id: &str) -> JobResult<Option<JobRecord>> {
    let id: JobId = job_id.parse()?;
    Ok(read_located(root, id)?.map(|(entry, bytes)| {
        record_from_entry(entry, &String::from_utf8_lossy(&bytes))
    }))
}

/// All jobs, newest first by modification time.
pub fn list_jobs(
    root: &Path,
    router_filter: Option<&str>,
    state_filter: Option<JobState>,
) -> JobResult<Vec<JobRecord>> {
    let mut entries: Vec<JobFileEntry> = scan_job_files(root)
        .into_iter()
        .filter(|e| router_filter.map_or(true, |r| e.router == r))
        .filter(|e| state_filter.map_or(true, |s| e.state == s))
        .collect();
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let content = match std::fs::read(&entry.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            // Renamed since the scan; the listing keeps the state it saw.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(JobError::io(&entry.path, e)),
        };
        records.push(record_from_entry(entry, &content));
    }
    Ok(records)
}

/// Raw job file bytes, for replaying history before tailing.
pub fn read_job_log(root: &Path, job_id: &str) -> JobResult<Vec<u8>> {
    let id: JobId = job_id.parse()?;
    read_located(root, id)?
        .map(|(_, bytes)| bytes)
        .ok_or_else(|| JobError::not_found(job_id))
}

/// The recorded outcome, or `None` while the job is not terminal.
pub fn read_job_result(root: &Path, job_id: &str) -> JobResult<Option<JobOutcome>> {
    let record = find_job_by_id(root, job_id)?.ok_or_else(|| JobError::not_found(job_id))?;
    if !record.state.is_terminal() {
        return Ok(None);
    }
    Ok(record.metadata.and_then(|m| m.result))
}
