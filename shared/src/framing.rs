//! Newline-delimited record framing over a byte stream
//!
//! A stream socket has no message boundaries: one read may return half a
//! record or several records glued together. Each message is written as one
//! JSON record followed by `DELIMITER`; the decoder buffers bytes until a
//! delimiter shows up and keeps any trailing partial record for the next read.

use crate::error::DecodeError;
use crate::protocol::Message;
use log::{debug, warn};

pub const DELIMITER: u8 = b'\n';

/// A record that grows past this without a delimiter is dropped
pub const MAX_RECORD_BYTES: usize = 1 << 20;

/// Serializes one message as a delimited record
pub fn encode(message: &Message) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(DELIMITER);
    Ok(bytes)
}

/// Serializes a batch into a single buffer so it can go out in one write
pub fn encode_batch(messages: &[Message]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(messages.len() * 64);
    for message in messages {
        match serde_json::to_writer(&mut bytes, message) {
            Ok(()) => bytes.push(DELIMITER),
            Err(e) => warn!("Dropping unserializable {} message: {}", message.kind(), e),
        }
    }
    bytes
}

/// Parses a single record (without its delimiter)
pub fn decode_record(record: &[u8]) -> Result<Message, DecodeError> {
    let text =
        std::str::from_utf8(record).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|kind| kind.as_str())
        .unwrap_or("<missing>")
        .to_string();

    serde_json::from_value(value).map_err(|e| DecodeError::Protocol {
        kind,
        reason: e.to_string(),
    })
}

/// Incremental unframer for one receive stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    malformed: u64,
    violations: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes and returns every message completed by them, in order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Message> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == DELIMITER) {
            let end = start + offset;
            let record = &self.buffer[start..end];
            start = end + 1;

            if record.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            match decode_record(record) {
                Ok(message) => messages.push(message),
                Err(e @ DecodeError::Malformed(_)) => {
                    self.malformed += 1;
                    warn!("Discarding record ({} malformed so far): {}", self.malformed, e);
                }
                Err(e @ DecodeError::Protocol { .. }) => {
                    self.violations += 1;
                    warn!("Discarding record ({} violations so far): {}", self.violations, e);
                }
            }
        }

        self.buffer.drain(..start);

        if self.buffer.len() > MAX_RECORD_BYTES {
            self.malformed += 1;
            warn!(
                "Discarding {} buffered bytes without a record delimiter",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        if !messages.is_empty() {
            debug!(
                "Decoded {} messages, {} bytes pending",
                messages.len(),
                self.buffer.len()
            );
        }

        messages
    }

    /// Bytes of an incomplete record waiting for more input
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    /// Total records discarded for any reason
    pub fn discarded(&self) -> u64 {
        self.malformed + self.violations
    }
}
