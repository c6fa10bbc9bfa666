//! Job lifecycle states and control requests.
//!
//! Both are encoded on disk as file extensions: a job file's extension is its
//! [`JobState`], a sibling sentinel's extension is a [`ControlRequest`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// ```text
/// running ──► paused ──► running
///    │           │
///    │           └──────► cancelled
///    ├──────────────────► completed
///    └──────────────────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Running,
        JobState::Paused,
        JobState::Completed,
        JobState::Cancelled,
    ];

    /// File extension (and wire name) for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Parse a file extension. Returns `None` for anything that is not a job state.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "running" => Some(JobState::Running),
            "paused" => Some(JobState::Paused),
            "completed" => Some(JobState::Completed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled files are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Running, JobState::Paused)
                | (JobState::Paused, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Cancelled)
                | (JobState::Paused, JobState::Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::from_extension(s).ok_or_else(|| format!("unknown job state '{s}'"))
    }
}

/// A pause/resume/cancel request dropped next to a job file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRequest {
    Pause,
    Resume,
    Cancel,
}

impl ControlRequest {
    pub const ALL: [ControlRequest; 3] = [
        ControlRequest::Pause,
        ControlRequest::Resume,
        ControlRequest::Cancel,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ControlRequest::Pause => "pause_requested",
            ControlRequest::Resume => "resume_requested",
            ControlRequest::Cancel => "cancel_requested",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlRequest::Pause => "pause",
            ControlRequest::Resume => "resume",
            ControlRequest::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(ControlRequest::Pause),
            "resume" => Ok(ControlRequest::Resume),
            "cancel" => Ok(ControlRequest::Cancel),
            other => Err(format!("unknown control action '{other}'")),
        }
    }
}
