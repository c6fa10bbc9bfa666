//! Job metadata carried by the `start_json` / `end_json` blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sse::{EventKind, SseEvent};
use crate::state::JobState;

/// `2025-01-15T14:20:30.000000Z`
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Final outcome recorded in `end_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub ok: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: String,
    pub state: JobState,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub monitor_url: String,
    pub started_utc: String,
    #[serde(default)]
    pub finished_utc: Option<String>,
    #[serde(default)]
    pub result: Option<JobOutcome>,
}

impl JobMetadata {
    pub fn to_event(&self, kind: EventKind) -> serde_json::Result<SseEvent> {
        Ok(SseEvent::new(kind, serde_json::to_string(self)?))
    }

    /// Lenient decode of a `start_json`/`end_json` payload.
    pub fn from_event(event: &SseEvent) -> Option<Self> {
        serde_json::from_str(&event.data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_format_utc_microseconds() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 14, 20, 30).unwrap();
        assert_eq!(format_utc(ts), "2025-01-15T14:20:30.000000Z");
    }

    #[test]
    fn test_start_json_field_order_and_nulls() {
        let meta = JobMetadata {
            job_id: "jb_42".into(),
            state: JobState::Running,
            source_url: "https://example.com".into(),
            monitor_url: "/api/jobs/jb_42/monitor".into(),
            started_utc: "2025-01-15T14:20:30.000000Z".into(),
            finished_utc: None,
            result: None,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            json,
            "{\"job_id\":\"jb_42\",\"state\":\"running\",\"source_url\":\"https://example.com\",\
             \"monitor_url\":\"/api/jobs/jb_42/monitor\",\"started_utc\":\"2025-01-15T14:20:30.000000Z\",\
             \"finished_utc\":null,\"result\":null}"
        );
    }

    #[test]
    fn test_outcome_roundtrip_through_event() {
        let data = json!({"processed": 20, "total": 20});
        let meta = JobMetadata {
            job_id: "jb_1".into(),
            state: JobState::Completed,
            source_url: String::new(),
            monitor_url: String::new(),
            started_utc: "2025-01-15T14:20:30.000000Z".into(),
            finished_utc: Some("2025-01-15T14:21:30.000000Z".into()),
            result: Some(JobOutcome {
                ok: true,
                error: String::new(),
                data: data.as_object().unwrap().clone(),
            }),
        };
        let event = meta.to_event(EventKind::EndJson).unwrap();
        assert_eq!(JobMetadata::from_event(&event), Some(meta));
    }

    #[test]
    fn test_from_event_tolerates_garbage() {
        let event = SseEvent::new(EventKind::StartJson, "{not json");
        assert!(JobMetadata::from_event(&event).is_none());
    }
}
