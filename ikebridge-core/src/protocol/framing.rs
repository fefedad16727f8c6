//! Stream framing for self-delimiting JSON documents
//!
//! The control socket carries no length prefix. Bytes are buffered until a
//! complete JSON value is available; values may arrive split across reads
//! or back to back in a single read.

use serde_json::Value;

use crate::error::DecodeError;

/// Incremental decoder turning a byte stream into JSON values
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_message_bytes: usize,
}

impl FrameDecoder {
    /// Create a decoder that rejects single messages above `max_message_bytes`
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_bytes,
        }
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete value
    ///
    /// Returns `Ok(None)` when more bytes are needed. On a syntax error or an
    /// oversized message the buffer is discarded so the stream can recover
    /// with the next write.
    pub fn next_value(&mut self) -> Result<Option<Value>, DecodeError> {
        let start = self
            .buffer
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buffer.len());
        self.buffer.drain(..start);

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut stream = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                self.buffer.drain(..consumed);
                if consumed > self.max_message_bytes {
                    return Err(DecodeError::Oversized {
                        limit: self.max_message_bytes,
                    });
                }
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buffer.len() > self.max_message_bytes {
                    self.buffer.clear();
                    return Err(DecodeError::Oversized {
                        limit: self.max_message_bytes,
                    });
                }
                Ok(None)
            }
            Some(Err(e)) => {
                self.buffer.clear();
                Err(DecodeError::MalformedRequest {
                    reason: e.to_string(),
                })
            }
            None => Ok(None),
        }
    }
}
