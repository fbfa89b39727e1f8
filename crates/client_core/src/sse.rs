//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines and
//! yields one [`SseFrame`] per dispatched event.

use crate::error::StreamError;

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Longest line the decoder buffers before giving up on the stream.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, `None` for the default `message` type.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

#[derive(Debug)]
pub struct SseDecoder {
    line: Vec<u8>,
    max_line_bytes: usize,
    /// Leading bytes matched against the byte-order mark; `None` once the
    /// start of the stream has been settled.
    bom_matched: Option<usize>,
    skip_next_lf: bool,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_event_id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            line: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            bom_matched: Some(0),
            skip_next_lf: false,
            data: String::new(),
            has_data: false,
            event: None,
            last_event_id: None,
        }
    }

    /// Decoder for a reconnected stream that continues after `last_event_id`.
    pub fn resuming(last_event_id: Option<String>) -> Self {
        Self {
            last_event_id,
            ..Self::new()
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feeds one chunk and returns the events it completed. Fails once a
    /// single line outgrows the configured limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, StreamError> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if let Some(matched) = self.bom_matched {
                if byte == BOM[matched] {
                    self.bom_matched = (matched + 1 < BOM.len()).then_some(matched + 1);
                    continue;
                }
                self.bom_matched = None;
                self.line.extend_from_slice(&BOM[..matched]);
            }
            if self.skip_next_lf {
                self.skip_next_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    self.skip_next_lf = true;
                    self.finish_line(&mut frames);
                }
                b'\n' => self.finish_line(&mut frames),
                other => {
                    if self.line.len() >= self.max_line_bytes {
                        return Err(StreamError::transport(
                            None,
                            format!("event stream line exceeds {} bytes", self.max_line_bytes),
                        ));
                    }
                    self.line.push(other);
                }
            }
        }
        Ok(frames)
    }

    fn finish_line(&mut self, frames: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&raw);

        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            // `retry` only matters to clients that reconnect on their own.
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().filter(|name| !name.is_empty());
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        })
    }
}
