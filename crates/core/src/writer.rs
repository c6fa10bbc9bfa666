//! The per-job writer: owns one job file and mirrors the live SSE stream
//! into it.
//!
//! Ordering guarantees:
//! - `start_json`, `end_json` and control-triggered log lines are written
//!   immediately, after flushing anything buffered before them.
//! - Plain log lines are buffered up to [`JobOptions::buffer_size`] entries.
//! - The terminal rename happens in [`StreamingJobWriter::finalize`], after
//!   `end_json` is on disk under the old extension, so a terminal extension
//!   always implies complete content.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::allocator::{create_job_file, DEFAULT_SCAN_LIMIT};
use crate::console::RequestLog;
use crate::error::{JobError, JobResult};
use crate::metadata::{format_utc, JobMetadata, JobOutcome};
use crate::sse::{EventKind, SseEvent};
use crate::state::{ControlRequest, JobState};
use crate::store::{control_path, transition, JobFileName};

pub const CANCEL_MESSAGE: &str = "Cancel requested, stopping...";
pub const PAUSE_MESSAGE: &str = "Pause requested, pausing...";
pub const RESUME_MESSAGE: &str = "Resume requested, resuming...";

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Log blocks held in memory before a flush. 0 and 1 mean write-through.
    pub buffer_size: usize,
    /// Sleep between sentinel checks while paused.
    pub poll_interval: Duration,
    /// Id allocation attempts before giving up.
    pub max_create_attempts: usize,
    /// Newest job files considered when allocating an id.
    pub scan_limit: usize,
    /// `monitor_url` is `<prefix>/<job_id>/monitor`.
    pub monitor_prefix: String,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            buffer_size: 10,
            poll_interval: Duration::from_millis(150),
            max_create_attempts: 5,
            scan_limit: DEFAULT_SCAN_LIMIT,
            monitor_prefix: "/api/jobs".to_string(),
        }
    }
}

/// What the work loop should do after a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Continue,
    Cancel,
    /// The file was just renamed to `paused`. Forward the emitted blocks, then
    /// await [`StreamingJobWriter::wait_while_paused`].
    Pause,
}

/// Result of [`StreamingJobWriter::check_control`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCheck {
    /// SSE blocks emitted while handling control requests, to be forwarded
    /// to the live stream.
    pub emitted: Vec<String>,
    pub action: ControlAction,
}

impl ControlCheck {
    fn proceed(emitted: Vec<String>) -> Self {
        Self {
            emitted,
            action: ControlAction::Continue,
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.action == ControlAction::Cancel
    }
}

pub struct StreamingJobWriter {
    router: String,
    name: JobFileName,
    path: PathBuf,
    state: JobState,
    source_url: String,
    monitor_url: String,
    started: DateTime<Utc>,
    buffer: Vec<String>,
    options: JobOptions,
    cancelled: bool,
    pending_terminal: Option<JobState>,
    ended: bool,
    finalized: bool,
}

impl StreamingJobWriter {
    /// Allocate an id and create `<root>/<router>/<...>.running`.
    pub fn create(
        root: &Path,
        router: &str,
        action: &str,
        object_id: Option<&str>,
        source_url: &str,
        options: JobOptions,
    ) -> JobResult<Self> {
        let started = Utc::now();
        let created = create_job_file(
            root,
            router,
            action,
            object_id,
            started,
            options.scan_limit,
            options.max_create_attempts,
        )?;
        let monitor_url = format!(
            "{}/{}/monitor",
            options.monitor_prefix.trim_end_matches('/'),
            created.name.job_id
        );
        info!(
            job_id = %created.name.job_id,
            router,
            action,
            path = %created.path.display(),
            "job created"
        );
        metrics::counter!("jobs_started_total", "router" => router.to_string()).increment(1);
        Ok(Self {
            router: router.to_string(),
            name: created.name,
            path: created.path,
            state: JobState::Running,
            source_url: source_url.to_string(),
            monitor_url,
            started,
            buffer: Vec::new(),
            options,
            cancelled: false,
            pending_terminal: None,
            ended: false,
            finalized: false,
        })
    }

    pub fn job_id(&self) -> String {
        self.name.job_id.to_string()
    }

    pub fn router(&self) -> &str {
        &self.router
    }

    /// Current on-disk path (changes with every state rename).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn monitor_url(&self) -> &str {
        &self.monitor_url
    }

    /// True once a cancel request has been observed by [`Self::check_control`].
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn metadata(&self, state: JobState, finished: Option<String>, result: Option<JobOutcome>) -> JobMetadata {
        JobMetadata {
            job_id: self.job_id(),
            state,
            source_url: self.source_url.clone(),
            monitor_url: self.monitor_url.clone(),
            started_utc: format_utc(self.started),
            finished_utc: finished,
            result,
        }
    }

    fn append(&self, text: &str) -> JobResult<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| JobError::io(&self.path, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| JobError::io(&self.path, e))
    }

    /// Write buffered log blocks to disk.
    ///
    /// The buffer is only cleared once the append succeeds.
    pub fn flush(&mut self) -> JobResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.append(&self.buffer.concat())?;
        self.buffer.clear();
        Ok(())
    }

    /// Flush, then write `text` straight to disk.
    fn write_immediate(&mut self, text: &str) -> JobResult<()> {
        self.flush()?;
        self.append(text)
    }

    /// Write the `start_json` block. Never buffered.
    pub fn emit_start(&mut self) -> JobResult<String> {
        let text = self
            .metadata(JobState::Running, None, None)
            .to_event(EventKind::StartJson)?
            .encode();
        self.write_immediate(&text)?;
        Ok(text)
    }

    /// Buffer a `log` block and return its SSE text for the live stream.
    pub fn emit_log(&mut self, message: &str) -> JobResult<String> {
        let text = SseEvent::log(message).encode();
        self.buffer.push(text.clone());
        if self.buffer.len() >= self.options.buffer_size.max(1) {
            self.flush()?;
        }
        Ok(text)
    }

    /// [`Self::emit_log`] plus a console line through the request context.
    pub fn emit_log_with_standard_logging(
        &mut self,
        ctx: &RequestLog,
        message: &str,
    ) -> JobResult<String> {
        ctx.log(message);
        self.emit_log(message)
    }

    fn emit_control_log(&mut self, message: &str) -> JobResult<String> {
        let text = SseEvent::log(message).encode();
        self.write_immediate(&text)?;
        Ok(text)
    }

    /// Delete the sentinel for `request` if present. True if it existed.
    fn consume(&self, request: ControlRequest) -> JobResult<bool> {
        let sentinel = control_path(&self.path, request);
        match std::fs::remove_file(&sentinel) {
            Ok(()) => {
                debug!(job_id = %self.name.job_id, request = %request, "control request consumed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(JobError::io(sentinel, e)),
        }
    }

    fn set_state(&mut self, next: JobState) -> JobResult<()> {
        self.path = transition(&self.path, self.state, next)?;
        self.state = next;
        Ok(())
    }

    fn cancel(&mut self, mut emitted: Vec<String>) -> JobResult<ControlCheck> {
        emitted.push(self.emit_control_log(CANCEL_MESSAGE)?);
        self.cancelled = true;
        info!(job_id = %self.name.job_id, "job cancel requested");
        Ok(ControlCheck {
            emitted,
            action: ControlAction::Cancel,
        })
    }

    /// Non-blocking half of a checkpoint.
    ///
    /// Consumes a pending cancel or pause request. After a pause the action is
    /// [`ControlAction::Pause`] and the pause line is already on disk, so the
    /// caller should hand `emitted` to the live stream before waiting.
    pub fn poll_control(&mut self) -> JobResult<ControlCheck> {
        self.flush()?;
        let emitted = Vec::new();

        if self.consume(ControlRequest::Cancel)? {
            return self.cancel(emitted);
        }

        if self.state == JobState::Running && self.consume(ControlRequest::Pause)? {
            let text = self.emit_control_log(PAUSE_MESSAGE)?;
            self.set_state(JobState::Paused)?;
            info!(job_id = %self.name.job_id, "job paused");
            return Ok(ControlCheck {
                emitted: vec![text],
                action: ControlAction::Pause,
            });
        }

        if self.consume(ControlRequest::Resume)? {
            debug!(job_id = %self.name.job_id, "discarded resume request for a running job");
        }

        Ok(ControlCheck::proceed(emitted))
    }

    /// Suspend this task (and only this task) until a resume or cancel
    /// request arrives. Returns at once if the job is not paused.
    pub async fn wait_while_paused(&mut self) -> JobResult<ControlCheck> {
        let mut emitted = Vec::new();
        if self.state != JobState::Paused {
            return Ok(ControlCheck::proceed(emitted));
        }

        loop {
            tokio::time::sleep(self.options.poll_interval).await;

            if self.consume(ControlRequest::Cancel)? {
                return self.cancel(emitted);
            }
            if self.consume(ControlRequest::Resume)? {
                emitted.push(self.emit_control_log(RESUME_MESSAGE)?);
                self.set_state(JobState::Running)?;
                info!(job_id = %self.name.job_id, "job resumed");
                return Ok(ControlCheck::proceed(emitted));
            }
            if self.consume(ControlRequest::Pause)? {
                debug!(job_id = %self.name.job_id, "duplicate pause request while paused");
            }
        }
    }

    /// Cooperative checkpoint. Call once per unit of work.
    ///
    /// [`Self::poll_control`] followed by [`Self::wait_while_paused`]. Blocks
    /// produced by both halves come back together, so a caller that streams
    /// them live should drive the two halves itself.
    pub async fn check_control(&mut self) -> JobResult<ControlCheck> {
        let mut check = self.poll_control()?;
        if check.action == ControlAction::Pause {
            let resumed = self.wait_while_paused().await?;
            check.emitted.extend(resumed.emitted);
            check.action = resumed.action;
        }
        Ok(check)
    }

    /// Write the `end_json` block. The terminal rename waits for
    /// [`Self::finalize`].
    pub fn emit_end(
        &mut self,
        ok: bool,
        error: &str,
        data: Map<String, Value>,
    ) -> JobResult<String> {
        if self.ended {
            return Err(JobError::AlreadyEnded {
                job_id: self.job_id(),
            });
        }
        let terminal = if self.cancelled {
            JobState::Cancelled
        } else {
            JobState::Completed
        };
        // paused -> completed is not an edge; an uncancelled job that stops
        // while paused goes back to running first.
        if terminal == JobState::Completed && self.state == JobState::Paused {
            self.set_state(JobState::Running)?;
            info!(job_id = %self.name.job_id, "paused job ending without cancel, back to running");
        }
        let outcome = JobOutcome {
            ok,
            error: error.to_string(),
            data,
        };
        let text = self
            .metadata(terminal, Some(format_utc(Utc::now())), Some(outcome))
            .to_event(EventKind::EndJson)?
            .encode();
        self.write_immediate(&text)?;
        self.ended = true;
        self.pending_terminal = Some(terminal);
        Ok(text)
    }

    /// Flush leftovers and, if the job ended, rename to its terminal state.
    ///
    /// Safe to call more than once. A writer that never ended keeps its
    /// running/paused extension so the job shows as abandoned.
    pub fn finalize(&mut self) -> JobResult<()> {
        self.finalized = true;
        self.flush()?;
        if let Some(terminal) = self.pending_terminal.take() {
            self.set_state(terminal)?;
            self.discard_stale_requests();
            info!(job_id = %self.name.job_id, state = %terminal, "job finished");
            metrics::counter!(
                "jobs_finished_total",
                "router" => self.router.clone(),
                "state" => terminal.as_str()
            )
            .increment(1);
        }
        Ok(())
    }
}

impl StreamingJobWriter {
    /// Remove sentinels that arrived after the last checkpoint. Nothing reads
    /// them once the job is terminal.
    fn discard_stale_requests(&self) {
        for request in ControlRequest::ALL {
            let sentinel = control_path(&self.path, request);
            match std::fs::remove_file(&sentinel) {
                Ok(()) => info!(
                    job_id = %self.name.job_id,
                    request = %request,
                    "dropped control request that arrived after the last checkpoint"
                ),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    job_id = %self.name.job_id,
                    request = %request,
                    path = %sentinel.display(),
                    error = %e,
                    "failed to remove stale control request"
                ),
            }
        }
    }
}

impl Drop for StreamingJobWriter {
    fn drop(&mut self) {
        if self.finalized && self.buffer.is_empty() && self.pending_terminal.is_none() {
            return;
        }
        if let Err(e) = self.finalize() {
            warn!(job_id = %self.name.job_id, error = %e, "finalize on drop failed");
        }
    }
}
