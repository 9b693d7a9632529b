use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Queued,
    SelectingProvider,
    HeadersReceived,
    Generating,
    Finalize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub percent: u32,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl ProgressFrame {
    pub fn new(fraction: f64, phase: Phase) -> Self {
        Self {
            percent: percent_of(fraction),
            phase,
            provider: None,
            ttfb_ms: None,
            upstream_status: None,
            elapsed_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatFrame {
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteFrame {
    pub finished_at: i64,
    pub elapsed_ms: u64,
}

/// A synthetic event written by the gateway itself.
///
/// These use named SSE events so a client can tell them apart from the
/// provider's own (unnamed `data:`) events that are relayed in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Progress(ProgressFrame),
    Heartbeat(HeartbeatFrame),
    Error(ErrorFrame),
    Complete(CompleteFrame),
}

impl Frame {
    pub fn event_name(&self) -> &'static str {
        match self {
            Frame::Progress(_) => "progress",
            Frame::Heartbeat(_) => "heartbeat",
            Frame::Error(_) => "error",
            Frame::Complete(_) => "complete",
        }
    }

    pub fn encode(&self) -> Bytes {
        let data = match self {
            Frame::Progress(frame) => serde_json::to_string(frame),
            Frame::Heartbeat(frame) => serde_json::to_string(frame),
            Frame::Error(frame) => serde_json::to_string(frame),
            Frame::Complete(frame) => serde_json::to_string(frame),
        }
        // Plain structs of strings and integers always serialize.
        .unwrap_or_default();
        encode_sse(self.event_name(), &data)
    }

    /// Parses one encoded synthetic frame. Returns `None` for anything that
    /// is not a single named gateway event, e.g. relayed upstream bytes.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let mut event = None;
        let mut data = String::new();
        for line in text.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value.trim_start());
            }
        }
        match event? {
            "progress" => serde_json::from_str(&data).ok().map(Frame::Progress),
            "heartbeat" => serde_json::from_str(&data).ok().map(Frame::Heartbeat),
            "error" => serde_json::from_str(&data).ok().map(Frame::Error),
            "complete" => serde_json::from_str(&data).ok().map(Frame::Complete),
            _ => None,
        }
    }
}

pub fn percent_of(fraction: f64) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

fn encode_sse(event: &str, data: &str) -> Bytes {
    let mut out = String::with_capacity(event.len() + data.len() + 16);
    out.push_str("event: ");
    out.push_str(event);
    out.push('\n');
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}
