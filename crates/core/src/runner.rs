//! The canonical per-item work loop, exposed as a stream of SSE strings.
//!
//! Every string yielded here has also been handed to the job's writer, so the
//! live stream and the persisted log carry the same sequence of blocks.

use std::fmt::Display;
use std::future::Future;

use serde_json::{json, Map, Value};
use tokio_stream::Stream;
use tracing::warn;

use crate::console::RequestLog;
use crate::error::JobError;
use crate::writer::{ControlAction, StreamingJobWriter};

/// Result data for an interrupted or finished item loop.
fn summary(processed: usize, total: usize, failed: Vec<Value>) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("processed".into(), json!(processed));
    data.insert("total".into(), json!(total));
    if !failed.is_empty() {
        data.insert("failed".into(), Value::Array(failed));
    }
    data
}

/// Drive `work` over `items` with a control checkpoint before each item.
///
/// Per-item errors are logged and collected under `data.failed` without
/// stopping the job. A cancel request stops the loop and ends the job with
/// `ok=false, error="cancelled"`. A writer I/O error stops the loop and
/// ends the job with that error, best-effort. The writer is finalized on
/// every path, including when the consumer drops the stream early.
pub fn run_items<T, F, Fut>(
    mut writer: StreamingJobWriter,
    ctx: RequestLog,
    items: Vec<T>,
    mut work: F,
) -> impl Stream<Item = String> + Send
where
    T: Display + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), String>> + Send,
{
    async_stream::stream! {
        let total = items.len();
        let mut processed = 0usize;
        let mut failed: Vec<Value> = Vec::new();
        let mut failure: Option<JobError> = None;

        match writer.emit_start() {
            Ok(text) => yield text,
            Err(e) => failure = Some(e),
        }

        if failure.is_none() {
            for (index, item) in items.into_iter().enumerate() {
                // The pause line goes out before the wait so the live stream
                // never trails the file.
                let check = match writer.poll_control() {
                    Ok(check) => check,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                let paused = check.action == ControlAction::Pause;
                let mut cancel = check.is_cancel();
                for text in check.emitted {
                    yield text;
                }
                if paused {
                    let resumed = match writer.wait_while_paused().await {
                        Ok(check) => check,
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    };
                    cancel = resumed.is_cancel();
                    for text in resumed.emitted {
                        yield text;
                    }
                }
                if cancel {
                    break;
                }

                let label = item.to_string();
                let line = format!("[ {} / {} ] Processing '{}'...", index + 1, total, label);
                match writer.emit_log_with_standard_logging(&ctx, &line) {
                    Ok(text) => yield text,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }

                if let Err(err) = work(item).await {
                    let line = format!("  failed: {err}");
                    failed.push(json!({ "item": label, "error": err }));
                    match writer.emit_log_with_standard_logging(&ctx, &line) {
                        Ok(text) => yield text,
                        Err(e) => {
                            processed += 1;
                            failure = Some(e);
                            break;
                        }
                    }
                }
                processed += 1;
            }
        }

        let (ok, error) = match (&failure, writer.is_cancelled()) {
            (Some(e), _) => {
                warn!(job_id = %writer.job_id(), error = %e, "job aborted by write failure");
                (false, e.to_string())
            }
            (None, true) => (false, "cancelled".to_string()),
            (None, false) => (true, String::new()),
        };

        match writer.emit_end(ok, &error, summary(processed, total, failed)) {
            Ok(text) => yield text,
            Err(e) => warn!(job_id = %writer.job_id(), error = %e, "failed to write end block"),
        }
        if let Err(e) = writer.finalize() {
            warn!(job_id = %writer.job_id(), error = %e, "failed to finalize job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::{parse_events, EventKind, SseEvent};
    use crate::state::ControlRequest;
    use crate::store::control_path;
    use crate::writer::{JobOptions, PAUSE_MESSAGE, RESUME_MESSAGE};
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_item_failures_are_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            StreamingJobWriter::create(dir.path(), "batch", "run", None, "", JobOptions::default())
                .unwrap();
        let path = writer.path().with_extension("completed");

        let stream = run_items(
            writer,
            RequestLog::detached("batch"),
            vec!["a", "bad", "c"],
            |item| async move {
                if item == "bad" {
                    Err("unreadable".to_string())
                } else {
                    Ok(())
                }
            },
        );
        let yielded: Vec<String> = stream.collect().await;

        let events = parse_events(&yielded.concat());
        let end = events.last().unwrap();
        assert_eq!(end.kind, EventKind::EndJson);
        let end: Value = serde_json::from_str(&end.data).unwrap();
        assert_eq!(end["state"], "completed");
        assert_eq!(end["result"]["ok"], true);
        assert_eq!(end["result"]["data"]["processed"], 3);
        assert_eq!(end["result"]["data"]["failed"][0]["item"], "bad");
        assert_eq!(end["result"]["data"]["failed"][0]["error"], "unreadable");

        assert!(yielded.iter().any(|t| t.contains("data:   failed: unreadable")));
        assert_eq!(std::fs::read_to_string(path).unwrap(), yielded.concat());
    }

    #[tokio::test]
    async fn test_pause_line_is_streamed_while_paused() {
        let dir = tempfile::tempdir().unwrap();
        let options = JobOptions {
            poll_interval: std::time::Duration::from_millis(10),
            ..JobOptions::default()
        };
        let writer =
            StreamingJobWriter::create(dir.path(), "batch", "run", None, "", options).unwrap();
        let running = writer.path().to_path_buf();
        let paused = running.with_extension("paused");
        std::fs::write(control_path(&running, ControlRequest::Pause), "").unwrap();

        let stream = run_items(writer, RequestLog::detached("batch"), vec!["a"], |_| async {
            Ok(())
        });
        let mut stream = Box::pin(stream);

        let start = stream.next().await.unwrap();
        assert!(start.starts_with("event: start_json"));
        let pause = stream.next().await.unwrap();
        assert_eq!(pause, SseEvent::log(PAUSE_MESSAGE).encode());
        // Still suspended: the file is paused and already holds the same blocks.
        assert!(paused.exists());
        assert_eq!(std::fs::read_to_string(&paused).unwrap(), format!("{start}{pause}"));

        std::fs::write(control_path(&paused, ControlRequest::Resume), "").unwrap();
        let rest: Vec<String> = stream.collect().await;
        assert_eq!(rest[0], SseEvent::log(RESUME_MESSAGE).encode());
        let end = parse_events(&rest.concat()).pop().unwrap();
        let end: Value = serde_json::from_str(&end.data).unwrap();
        assert_eq!(end["state"], "completed");
        assert!(running.with_extension("completed").exists());
    }

    #[test]
    fn test_summary_omits_empty_failures() {
        let data = summary(2, 5, Vec::new());
        assert_eq!(Value::Object(data), json!({"processed": 2, "total": 5}));
    }
}
