//! Incremental reader for a job log that may change extension under it.
//!
//! Tracks a byte offset so successive reads return only the SSE blocks
//! appended since the last read. When a state rename moves the file, the
//! follower re-locates it by job id and carries on from the same offset.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{JobError, JobResult};
use crate::sse::{parse_events, SseEvent};
use crate::state::JobState;
use crate::store::{locate_job_file, JobId};

/// Byte length up to and including the last block terminator.
fn complete_prefix_len(buf: &[u8]) -> usize {
    buf.windows(2)
        .rposition(|w| w == b"\n\n")
        .map_or(0, |pos| pos + 2)
}

pub struct JobLogFollower {
    root: PathBuf,
    job_id: JobId,
    path: PathBuf,
    state: JobState,
    /// Byte offset just past the last complete block returned.
    position: u64,
}

impl JobLogFollower {
    /// Follow `job_id` from the beginning of its log.
    ///
    /// The first read returns the full history, which is what a newly
    /// attached monitor wants to replay.
    pub fn open(root: &Path, job_id: &str) -> JobResult<Self> {
        let id: JobId = job_id.parse()?;
        let entry = locate_job_file(root, id).ok_or_else(|| JobError::not_found(job_id))?;
        Ok(Self {
            root: root.to_path_buf(),
            job_id: id,
            path: entry.path,
            state: entry.state,
            position: 0,
        })
    }

    /// State as of the last successful open of the file.
    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn relocate(&mut self) -> JobResult<()> {
        let entry = locate_job_file(&self.root, self.job_id)
            .ok_or_else(|| JobError::not_found(self.job_id.to_string()))?;
        self.path = entry.path;
        self.state = entry.state;
        Ok(())
    }

    async fn open_current(&mut self) -> JobResult<tokio::fs::File> {
        match tokio::fs::File::open(&self.path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.relocate()?;
                tokio::fs::File::open(&self.path)
                    .await
                    .map_err(|e| JobError::io(&self.path, e))
            }
            Err(e) => Err(JobError::io(&self.path, e)),
        }
    }

    /// Text of every complete block appended since the last read.
    ///
    /// A block still being written (no terminating blank line yet) is left
    /// for the next call.
    pub async fn read_new_blocks(&mut self) -> JobResult<String> {
        let mut file = self.open_current().await?;
        let file_len = file
            .metadata()
            .await
            .map_err(|e| JobError::io(&self.path, e))?
            .len();

        // Job logs are append-only; a shorter file means it was replaced.
        if file_len < self.position {
            self.position = 0;
        }
        if file_len == self.position {
            return Ok(String::new());
        }

        file.seek(SeekFrom::Start(self.position))
            .await
            .map_err(|e| JobError::io(&self.path, e))?;
        let mut buf = Vec::with_capacity((file_len - self.position) as usize);
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| JobError::io(&self.path, e))?;

        let consumed = complete_prefix_len(&buf);
        self.position += consumed as u64;
        Ok(String::from_utf8_lossy(&buf[..consumed]).into_owned())
    }

    /// [`Self::read_new_blocks`], decoded.
    pub async fn read_new_events(&mut self) -> JobResult<Vec<SseEvent>> {
        Ok(parse_events(&self.read_new_blocks().await?))
    }

    /// True when the job is terminal and there is nothing left to read.
    pub async fn is_drained(&mut self) -> JobResult<bool> {
        if !self.state.is_terminal() {
            return Ok(false);
        }
        let len = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| JobError::io(&self.path, e))?
            .len();
        Ok(len <= self.position)
    }
}
