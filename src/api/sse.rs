//! Minimal `text/event-stream` framing.
//!
//! Only what the push channel needs: `event`, `data` and `id` fields,
//! comment lines, any of the three line endings, and frames split across
//! arbitrary chunk boundaries.

use tracing::warn;

/// Event name the queue service emits when a doctor's queue changes.
pub const QUEUE_UPDATE_EVENT: &str = "queue-update";

/// Largest unterminated frame kept in memory.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn is_queue_update(&self) -> bool {
        self.event.as_deref() == Some(QUEUE_UPDATE_EVENT)
    }
}

/// Accumulates raw bytes and yields complete frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Last byte seen was `\r`; a following `\n` belongs to the same line end.
    after_cr: bool,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        for &byte in chunk {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            if byte == b'\r' {
                self.buf.push(b'\n');
                self.after_cr = true;
            } else {
                self.buf.push(byte);
            }
        }

        let mut frames = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw[..end])) {
                frames.push(frame);
            }
        }
        if self.buf.len() > MAX_FRAME_BYTES {
            warn!(buffered = self.buf.len(), "Dropping oversized push frame");
            self.buf.clear();
        }
        frames
    }
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut has_field = false;

    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => {
                if has_field && !frame.data.is_empty() {
                    frame.data.push('\n');
                }
                frame.data.push_str(value);
            }
            "id" => frame.id = Some(value.to_string()),
            _ => continue,
        }
        has_field = true;
    }

    has_field.then_some(frame)
}
