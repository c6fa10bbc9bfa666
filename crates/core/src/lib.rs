// crates/core/src/lib.rs
pub mod allocator;
pub mod console;
pub mod control;
pub mod error;
pub mod follow;
pub mod metadata;
pub mod paths;
pub mod query;
pub mod runner;
pub mod sse;
pub mod state;
pub mod store;
pub mod writer;

pub use allocator::{create_job_file, generate_job_id, CreatedJobFile};
pub use console::{RequestCounter, RequestLog};
pub use control::{request_cancel, request_control, request_pause, request_resume};
pub use error::*;
pub use follow::JobLogFollower;
pub use metadata::{JobMetadata, JobOutcome};
pub use query::{find_job_by_id, list_jobs, read_job_log, read_job_result, JobRecord};
pub use runner::run_items;
pub use sse::{parse_events, EventKind, SseEvent};
pub use state::{ControlRequest, JobState};
pub use store::{JobFileName, JobId};
pub use writer::{ControlAction, ControlCheck, JobOptions, StreamingJobWriter};
