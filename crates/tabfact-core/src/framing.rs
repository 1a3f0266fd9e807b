//! Newline-delimited JSON framing for streamed token events.
//!
//! The inference backend answers with one JSON object per line, e.g.
//! `{"model":"cogito","response":"The","done":false}`. Reads from the
//! network do not respect line boundaries, so the framer keeps the partial
//! tail of each read until the newline (or end of stream) arrives.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from decoding a single line.
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Malformed token line: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One decoded token event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Text fragment produced by the model
    #[serde(default)]
    pub response: String,

    /// Set on the final event of a generation
    #[serde(default)]
    pub done: bool,

    /// Backend-reported failure; terminates the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse one NDJSON line into a token event.
pub fn parse_token_line(line: &str) -> Result<TokenEvent, FramingError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered rather than text so that a multi-byte UTF-8 sequence
/// split across two reads is decoded intact. `\n` never occurs inside a
/// multi-byte sequence, so splitting on it is always safe.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    ///
    /// Blank lines are dropped. A trailing `\r` is removed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Bytes currently waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the unterminated last line at end of stream, if it is not blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes);
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
