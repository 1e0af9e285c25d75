//! Upstream SSE frame assembly and payload decoding.
//!
//! Frames are delimited by a blank line and may spread one logical JSON
//! payload across several `data:` lines. Assembly is line-oriented over a
//! byte buffer, so frame boundaries are recovered identically no matter how
//! the transport splits the byte stream.

use bytes::{Buf, BytesMut};
use serde_json::Value;

/// The complete lines of one upstream frame.
pub type Frame = Vec<String>;

/// Incremental frame assembler over an upstream byte stream.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: BytesMut,
    lines: Vec<String>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return every frame completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw = self.buf.copy_to_bytes(pos + 1);
            let line = trim_line(&raw);
            if line.is_empty() {
                if !self.lines.is_empty() {
                    frames.push(std::mem::take(&mut self.lines));
                }
            } else {
                self.lines.push(line);
            }
        }
        frames
    }

    /// Flush whatever remains buffered as a final frame, if anything.
    ///
    /// Called once when the upstream stream ends; a stream that closes
    /// without a trailing blank line still yields its last frame.
    pub fn flush(&mut self) -> Option<Frame> {
        if !self.buf.is_empty() {
            let raw = self.buf.split();
            let line = trim_line(&raw);
            if !line.is_empty() {
                self.lines.push(line);
            }
        }
        if self.lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.lines))
        }
    }
}

fn trim_line(raw: &[u8]) -> String {
    let line = String::from_utf8_lossy(raw);
    line.trim_end_matches(['\n', '\r']).to_string()
}

/// Decode the JSON payloads carried by one frame.
///
/// The frame's `data:` lines are joined and parsed as one document first
/// (a payload may legitimately span lines); if that fails, each line is
/// parsed on its own and unparseable residue is dropped. `[DONE]` markers
/// and comment/heartbeat lines carry no payload.
pub fn decode_frame(frame: &[String]) -> Vec<Value> {
    let data_lines: Vec<&str> = frame
        .iter()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();

    if data_lines.is_empty() {
        return Vec::new();
    }

    let merged = data_lines.join("\n");
    let merged = merged.trim();
    if merged.is_empty() || merged == "[DONE]" {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(merged) {
        return vec![value];
    }

    data_lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && *line != "[DONE]")
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}
