//! SSE block codec shared by the live stream and the persisted job log.
//!
//! ```text
//! event: log
//! data: first line
//! data: second line
//!
//! ```
//!
//! Every block ends with a blank line. The decoder is a plain line scanner:
//! `event:` sets the kind, each `data:` appends a line, a blank line closes
//! the block. Unknown fields are ignored.

use std::fmt;

/// The event names the engine writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    StartJson,
    Log,
    EndJson,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::StartJson => "start_json",
            EventKind::Log => "log",
            EventKind::EndJson => "end_json",
            EventKind::Other(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "start_json" => EventKind::StartJson,
            "log" => EventKind::Log,
            "end_json" => EventKind::EndJson,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SSE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub kind: EventKind,
    /// Data lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn new(kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::new(EventKind::Log, message)
    }

    /// Render the block, one `data:` line per line of payload.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        out.push_str("event: ");
        out.push_str(self.kind.as_str());
        out.push('\n');
        for line in data_lines(&self.data) {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Split payload into lines, treating `\r\n`, `\r` and `\n` alike. An empty
/// payload still produces one (empty) data line.
fn data_lines(data: &str) -> Vec<&str> {
    if data.is_empty() {
        return vec![""];
    }
    let trimmed = data
        .strip_suffix("\r\n")
        .or_else(|| data.strip_suffix('\n'))
        .or_else(|| data.strip_suffix('\r'))
        .unwrap_or(data);
    let mut lines = Vec::new();
    for segment in trimmed.split('\n') {
        let segment = segment.strip_suffix('\r').unwrap_or(segment);
        lines.extend(segment.split('\r'));
    }
    lines
}

/// Parse every complete block in `text`. A trailing block without its
/// terminating blank line is ignored (it is still being written).
pub fn parse_events(text: &str) -> Vec<SseEvent> {
    let (complete, _) = split_complete(text);
    let mut events = Vec::new();
    let mut kind: Option<EventKind> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in complete.lines() {
        if line.is_empty() {
            if kind.is_some() || !data.is_empty() {
                events.push(SseEvent {
                    kind: kind.take().unwrap_or(EventKind::Log),
                    data: data.join("\n"),
                });
                data.clear();
            }
            continue;
        }
        if let Some(name) = line.strip_prefix("event:") {
            kind = Some(EventKind::parse(name.trim()));
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    events
}

/// Split `text` at the end of its last complete block.
///
/// Returns the complete prefix and the byte length of that prefix.
pub fn split_complete(text: &str) -> (&str, usize) {
    match text.rfind("\n\n") {
        Some(pos) => {
            let end = pos + 2;
            (&text[..end], end)
        }
        None => ("", 0),
    }
}
