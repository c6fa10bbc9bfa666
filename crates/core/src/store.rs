//! On-disk job file naming and state transitions.
//!
//! A job file lives at `<root>/<router>/<stem>.<state>` where the stem is
//!
//! ```text
//! <YYYY-MM-DD_HH-MM-SS>_[<action>]_[jb_<n>]_[<object_id>]
//! ```
//!
//! (the object segment is omitted when absent). The extension is the only
//! mutable part: a state transition is a single `rename(2)` of the extension,
//! so whatever extension is on disk after a crash *is* the job's state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{JobError, JobResult};
use crate::state::{ControlRequest, JobState};

/// Numeric job identifier, rendered as `jb_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jb_{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("jb_")
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse().ok())
            .map(JobId)
            .ok_or_else(|| JobError::InvalidJobId(s.to_string()))
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

fn stem_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})_\[([^\[\]]*)\]_\[jb_(\d+)\](?:_\[([^\[\]]*)\])?$",
        )
        .expect("static job file regex")
    })
}

/// Make a free-text value safe to embed in a job file name.
///
/// Path separators, filesystem-reserved characters, square brackets (the
/// grammar's delimiters) and control characters become `_`. Leading and
/// trailing whitespace and dots are trimmed; an empty result becomes `_`.
pub fn sanitize_component(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '[' | ']' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Identity part of a job file name (everything except the extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFileName {
    pub timestamp: String,
    pub action: String,
    pub job_id: JobId,
    pub object_id: Option<String>,
}

impl JobFileName {
    /// Build a name stamped with `created`, sanitizing the free-text parts.
    pub fn new(
        created: DateTime<Utc>,
        action: &str,
        job_id: JobId,
        object_id: Option<&str>,
    ) -> Self {
        Self {
            timestamp: created.format(TIMESTAMP_FORMAT).to_string(),
            action: sanitize_component(action),
            job_id,
            object_id: object_id.map(sanitize_component),
        }
    }

    pub fn stem(&self) -> String {
        match &self.object_id {
            Some(object_id) => format!(
                "{}_[{}]_[{}]_[{}]",
                self.timestamp, self.action, self.job_id, object_id
            ),
            None => format!("{}_[{}]_[{}]", self.timestamp, self.action, self.job_id),
        }
    }

    pub fn file_name(&self, state: JobState) -> String {
        format!("{}.{}", self.stem(), state.as_str())
    }

    pub fn control_file_name(&self, request: ControlRequest) -> String {
        format!("{}.{}", self.stem(), request.extension())
    }

    /// Parse `<stem>.<state>`. Anything else (control files, foreign files)
    /// yields `None`.
    pub fn parse(file_name: &str) -> Option<(Self, JobState)> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        let state = JobState::from_extension(ext)?;
        let name = Self::parse_stem(stem)?;
        Some((name, state))
    }

    fn parse_stem(stem: &str) -> Option<Self> {
        let caps = stem_regex().captures(stem)?;
        let id: u64 = caps.get(3)?.as_str().parse().ok()?;
        Some(Self {
            timestamp: caps.get(1)?.as_str().to_string(),
            action: caps.get(2)?.as_str().to_string(),
            job_id: JobId(id),
            object_id: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }
}

/// A job file found by a directory scan.
#[derive(Debug, Clone)]
pub struct JobFileEntry {
    pub path: PathBuf,
    pub router: String,
    pub name: JobFileName,
    pub state: JobState,
    pub modified: SystemTime,
}

/// Folder holding one router's job files.
pub fn router_dir(root: &Path, router: &str) -> PathBuf {
    root.join(sanitize_component(router))
}

/// List every job file under `<root>/<router>/`, in no particular order.
///
/// A missing root is an empty listing. Entries that vanish mid-scan (a
/// concurrent rename) are skipped.
pub fn scan_job_files(root: &Path) -> Vec<JobFileEntry> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry during job scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some((name, state)) = JobFileName::parse(file_name) else {
            continue;
        };
        let Some(router) = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
        else {
            continue;
        };
        let modified = match entry.metadata().map(|m| m.modified()) {
            Ok(Ok(t)) => t,
            _ => continue,
        };
        entries.push(JobFileEntry {
            path: entry.into_path(),
            router,
            name,
            state,
            modified,
        });
    }
    entries
}

/// Locate the single file currently holding `job_id`, whatever its state.
pub fn locate_job_file(root: &Path, job_id: JobId) -> Option<JobFileEntry> {
    scan_job_files(root)
        .into_iter()
        .filter(|e| e.name.job_id == job_id)
        .max_by_key(|e| e.modified)
}

/// `path` with its extension swapped for `state`.
pub fn path_with_state(path: &Path, state: JobState) -> PathBuf {
    path.with_extension(state.as_str())
}

/// Sentinel path for `request`, sharing the job file's stem.
pub fn control_path(path: &Path, request: ControlRequest) -> PathBuf {
    path.with_extension(request.extension())
}

/// Rename the job file at `path` from `from` to `to`.
///
/// Only the legal edges of the state machine are accepted. Returns the new path.
pub fn transition(path: &Path, from: JobState, to: JobState) -> JobResult<PathBuf> {
    if !from.can_transition_to(to) {
        return Err(JobError::InvalidTransition { from, to });
    }
    let next = path_with_state(path, to);
    std::fs::rename(path, &next).map_err(|e| JobError::io(path, e))?;
    debug!(from = %from, to = %to, path = %next.display(), "job state transition");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 14, 20, 30).unwrap()
    }

    #[test]
    fn test_job_id_display_and_parse() {
        assert_eq!(JobId(42).to_string(), "jb_42");
        assert_eq!("jb_42".parse::<JobId>().unwrap(), JobId(42));
        assert!("jb_".parse::<JobId>().is_err());
        assert!("42".parse::<JobId>().is_err());
        assert!("jb_4x".parse::<JobId>().is_err());
    }

    #[test]
    fn test_file_name_with_object_id() {
        let name = JobFileName::new(sample_time(), "crawl", JobId(42), Some("site_7"));
        assert_eq!(
            name.file_name(JobState::Running),
            "2025-01-15_14-20-30_[crawl]_[jb_42]_[site_7].running"
        );
        assert_eq!(
            name.control_file_name(ControlRequest::Cancel),
            "2025-01-15_14-20-30_[crawl]_[jb_42]_[site_7].cancel_requested"
        );
    }

    #[test]
    fn test_file_name_without_object_id() {
        let name = JobFileName::new(sample_time(), "embed", JobId(3), None);
        assert_eq!(
            name.file_name(JobState::Paused),
            "2025-01-15_14-20-30_[embed]_[jb_3].paused"
        );
    }

    #[test]
    fn test_parse_inverts_format() {
        let name = JobFileName::new(sample_time(), "crawl", JobId(9), Some("example.com"));
        let (parsed, state) = JobFileName::parse(&name.file_name(JobState::Completed)).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(state, JobState::Completed);

        let name = JobFileName::new(sample_time(), "crawl", JobId(10), None);
        let (parsed, _) = JobFileName::parse(&name.file_name(JobState::Running)).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(JobFileName::parse("notes.txt").is_none());
        assert!(JobFileName::parse("2025-01-15_14-20-30_[crawl]_[jb_1].cancel_requested").is_none());
        assert!(JobFileName::parse("2025-01-15_14-20-30_[crawl]_[job_1].running").is_none());
        assert!(JobFileName::parse("garbage.running").is_none());
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_component("what?*:<>|\""), "what_______");
        assert_eq!(sanitize_component("[x]"), "_x_");
        assert_eq!(sanitize_component("line\nbreak"), "line_break");
        assert_eq!(sanitize_component("  ..hidden.. "), "hidden");
        assert_eq!(sanitize_component(""), "_");
        assert_eq!(sanitize_component("https://example.com/a"), "https___example.com_a");
    }

    #[test]
    fn test_sanitized_components_parse_back() {
        let name = JobFileName::new(sample_time(), "re[crawl]/all", JobId(1), Some("a:b]"));
        let (parsed, _) = JobFileName::parse(&name.file_name(JobState::Running)).unwrap();
        assert_eq!(parsed.action, "re_crawl__all");
        assert_eq!(parsed.object_id.as_deref(), Some("a_b_"));
    }

    #[test]
    fn test_scan_and_transition() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_dir(dir.path(), "crawler");
        std::fs::create_dir_all(&router).unwrap();

        let name = JobFileName::new(sample_time(), "crawl", JobId(5), None);
        let path = router.join(name.file_name(JobState::Running));
        std::fs::write(&path, "event: log\ndata: hi\n\n").unwrap();
        std::fs::write(router.join("README.md"), "ignored").unwrap();
        std::fs::write(control_path(&path, ControlRequest::Pause), "").unwrap();

        let found = scan_job_files(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].router, "crawler");
        assert_eq!(found[0].state, JobState::Running);

        let paused = transition(&path, JobState::Running, JobState::Paused).unwrap();
        assert!(!path.exists());
        assert!(paused.exists());
        assert_eq!(
            std::fs::read_to_string(&paused).unwrap(),
            "event: log\ndata: hi\n\n"
        );

        let located = locate_job_file(dir.path(), JobId(5)).unwrap();
        assert_eq!(located.state, JobState::Paused);
        assert!(locate_job_file(dir.path(), JobId(50)).is_none());
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_[a]_[jb_1].completed");
        let err = transition(&path, JobState::Completed, JobState::Running).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_job_files(&dir.path().join("nope")).is_empty());
    }
}
