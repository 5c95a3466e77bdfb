//! Byte accumulation buffer for manager frames.
//!
//! Socket reads land here until a complete blank-line-terminated frame can be
//! split off the front. Bytes past the terminator stay for the next frame.

use crate::{
    constants::{BUF_CHUNK, MAX_BUFFER_SIZE},
    error::{AsteriskError, AsteriskResult},
};
use bytes::{Buf, BytesMut};

/// Growable byte buffer with pattern-delimited extraction.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
    max_size: usize,
}

impl FrameBuffer {
    /// Buffer with the default capacity and size limit.
    pub fn new() -> Self {
        Self::with_max_size(MAX_BUFFER_SIZE)
    }

    /// Buffer that refuses to grow past `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(BUF_CHUNK),
            max_size,
        }
    }

    /// Append raw bytes.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer
            .extend_from_slice(data);
    }

    /// Error if the buffer grew past its limit, which means the peer never
    /// terminated a frame.
    pub fn check_size_limits(&self) -> AsteriskResult<()> {
        if self.buffer.len() > self.max_size {
            return Err(AsteriskError::protocol_error(format!(
                "Buffer size {} exceeds limit {} without a frame terminator",
                self.buffer.len(),
                self.max_size
            )));
        }
        Ok(())
    }

    /// Position of the first occurrence of `pattern`.
    pub fn find_pattern(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() || self.buffer.len() < pattern.len() {
            return None;
        }
        self.buffer
            .windows(pattern.len())
            .position(|window| window == pattern)
    }

    /// Remove and return everything before `pattern`, consuming the pattern
    /// too. `None` (buffer untouched) if the pattern is not present yet.
    pub fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let pos = self.find_pattern(pattern)?;
        let data = self
            .buffer
            .split_to(pos);
        self.buffer
            .advance(pattern.len());
        Some(data.to_vec())
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer
            .clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_until_pattern() {
        let mut buffer = FrameBuffer::new();
        buffer.extend_from_slice(b"Event: Hangup\r\n\r\nEvent: Newchannel\r\n");

        let frame = buffer
            .extract_until_pattern(b"\r\n\r\n")
            .unwrap();
        assert_eq!(frame, b"Event: Hangup");
        assert_eq!(buffer.len(), "Event: Newchannel\r\n".len());
        assert!(buffer
            .extract_until_pattern(b"\r\n\r\n")
            .is_none());
    }

    #[test]
    fn test_pattern_split_across_pushes() {
        let mut buffer = FrameBuffer::new();
        buffer.extend_from_slice(b"Response: Success\r\n\r");
        assert!(buffer
            .extract_until_pattern(b"\r\n\r\n")
            .is_none());
        buffer.extend_from_slice(b"\n");
        assert_eq!(
            buffer
                .extract_until_pattern(b"\r\n\r\n")
                .unwrap(),
            b"Response: Success"
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend_from_slice(b"\r\n\r\n");
        assert_eq!(
            buffer
                .extract_until_pattern(b"\r\n\r\n")
                .unwrap(),
            b""
        );
    }

    #[test]
    fn test_size_limit() {
        let mut buffer = FrameBuffer::with_max_size(8);
        buffer.extend_from_slice(b"12345678");
        assert!(buffer
            .check_size_limits()
            .is_ok());
        buffer.extend_from_slice(b"9");
        assert!(matches!(
            buffer.check_size_limits(),
            Err(AsteriskError::ProtocolError { .. })
        ));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_find_pattern_short_buffer() {
        let mut buffer = FrameBuffer::new();
        buffer.extend_from_slice(b"\r\n");
        assert_eq!(buffer.find_pattern(b"\r\n\r\n"), None);
        assert_eq!(buffer.find_pattern(b"\r\n"), Some(0));
    }
}
