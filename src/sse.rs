//! # Incremental `text/event-stream` decoder.
//!
//! [`SseDecoder`] accepts raw body chunks in whatever sizes the transport hands
//! them over and yields complete [`Frame`]s:
//!
//! ```text
//! bytes ──► push() ──► line buffer ──► field lines ──► blank line ──► Frame
//! ```
//!
//! ## Rules
//! - Lines end with `\n`, `\r\n` or `\r` (a `\r` at a chunk edge is held until
//!   the next byte shows whether a `\n` follows).
//! - `:` lines are comments (keep-alives) and are ignored.
//! - `field: value` strips a single leading space from the value.
//! - Multiple `data` lines are joined with `\n`.
//! - A frame without any `data` line is not dispatched.
//! - The event type defaults to `message`.
//! - A line longer than [`MAX_LINE`] or that is not UTF-8 is malformed framing,
//!   as is a frame whose joined `data` grows past [`MAX_FRAME`].

use std::collections::VecDeque;

use crate::error::StreamError;

/// Upper bound for a single line, including a large JSON `data` payload.
pub const MAX_LINE: usize = 1024 * 1024;

/// Upper bound for the joined `data` of one frame.
pub const MAX_FRAME: usize = 4 * MAX_LINE;

/// Event type used when a frame carries no `event` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Streaming decoder for server-sent events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    pending_cr: bool,
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
    ready: VecDeque<Frame>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body.
    ///
    /// Complete frames become available through [`SseDecoder::next_frame`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), StreamError> {
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\n' => self.end_line()?,
                b'\r' => {
                    self.pending_cr = true;
                    self.end_line()?;
                }
                _ => {
                    if self.line.len() >= MAX_LINE {
                        return Err(StreamError::Framing(format!(
                            "line exceeds {} bytes",
                            MAX_LINE
                        )));
                    }
                    self.line.push(byte);
                }
            }
        }
        Ok(())
    }

    /// Pop the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.ready.pop_front()
    }

    /// The most recent `id` seen on this stream, for `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn end_line(&mut self) -> Result<(), StreamError> {
        let raw = std::mem::take(&mut self.line);
        let line = String::from_utf8(raw)
            .map_err(|e| StreamError::Framing(format!("invalid UTF-8: {}", e)))?;

        if line.is_empty() {
            self.dispatch();
            return Ok(());
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return Ok(());
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                let pending = self.data.as_ref().map_or(0, |d| d.len() + 1);
                if pending + value.len() > MAX_FRAME {
                    return Err(StreamError::Framing(format!(
                        "frame data exceeds {} bytes",
                        MAX_FRAME
                    )));
                }
                match self.data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                }
            }
            "id" => {
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                }
            }
            // `retry` and unknown fields are ignored; reconnect timing is ours
            _ => {}
        }
        Ok(())
    }

    fn dispatch(&mut self) {
        let event = self.event.take();
        let Some(data) = self.data.take() else {
            return;
        };

        let event = event
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());

        self.ready.push_back(Frame {
            event,
            data,
            id: self.id.clone(),
        });
    }
}
