//! Server-Sent Events framing and the batch stream's event vocabulary.

use serde::Deserialize;

use crate::model::ResultRecord;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type; `"message"` when the frame carried no `event:` field.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Longest line the decoder holds while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental SSE decoder. Feed it byte chunks as they arrive; it returns
/// every frame completed by the chunk.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Unterminated tail of the last chunk; never holds a newline.
    buf: Vec<u8>,
    /// Inside a line that overflowed `buf`; skip to its newline.
    discarding: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, mut chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return frames,
            }
        }

        // Only the new bytes can hold a newline.
        let mut search = self.buf.len();
        self.buf.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buf[search..].iter().position(|&b| b == b'\n') {
            let end = search + offset;
            let raw = &self.buf[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
            start = end + 1;
            search = start;
        }
        self.buf.drain(..start);

        if self.buf.len() > MAX_LINE_BYTES {
            log::warn!(
                "dropping SSE line longer than {MAX_LINE_BYTES} bytes ({} buffered)",
                self.buf.len()
            );
            self.buf = Vec::new();
            self.discarding = true;
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None; // comment / keep-alive
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {} // retry and unknown fields are not used
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletePayload {
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decoded event from the batch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Connected,
    Progress(ProgressPayload),
    Result(Box<ResultRecord>),
    Complete(CompletePayload),
    Error(ErrorPayload),
}

impl WireEvent {
    /// Decode a frame. Returns `Ok(None)` for event kinds this client does
    /// not use and `Err` for payloads that do not match their kind.
    pub fn decode(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        let event = match frame.event.as_str() {
            "connected" => WireEvent::Connected,
            "progress" => WireEvent::Progress(serde_json::from_str(&frame.data)?),
            "result" => WireEvent::Result(Box::new(serde_json::from_str(&frame.data)?)),
            "complete" => WireEvent::Complete(serde_json::from_str(&frame.data)?),
            "error" => WireEvent::Error(serde_json::from_str(&frame.data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}
