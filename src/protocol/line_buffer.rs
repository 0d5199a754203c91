//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Bytes are
//! appended as they arrive from the stream; every `\n` found closes a line,
//! and whatever follows the last terminator stays buffered for the next push.
//!
//! # Example
//!
//! ```
//! use agentwire::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! assert!(buffer.push(b"[1,{\"func\":\"pi").is_empty());
//! let lines = buffer.push(b"ng\"}]\n[2,");
//! assert_eq!(lines.len(), 1);
//! assert_eq!(&lines[0][..], b"[1,{\"func\":\"ping\"}]");
//! assert_eq!(buffer.len(), 3);
//! ```

use bytes::{Bytes, BytesMut};

/// Line terminator on the wire.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default initial buffer capacity (64KB).
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete lines.
///
/// Lines are returned without their terminator. Nothing is lost or
/// duplicated across chunk boundaries.
pub struct LineBuffer {
    /// Accumulated bytes not yet part of a complete line.
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no terminator.
    scanned: usize,
}

impl LineBuffer {
    /// Create a new line buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new line buffer with custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Push data into the buffer and extract all complete lines.
    ///
    /// Returns the lines completed by this chunk, in order. An incomplete
    /// trailing fragment is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();

        while let Some(line) = self.try_extract_one() {
            lines.push(line);
        }

        lines
    }

    /// Try to extract a single line from the buffer.
    fn try_extract_one(&mut self) -> Option<Bytes> {
        let offset = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR);

        match offset {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut line = self.buffer.split_to(end + 1);
                line.truncate(end);
                self.scanned = 0;
                Some(line.freeze())
            }
            None => {
                // Don't rescan these bytes on the next push
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    /// Take the unterminated tail, if any.
    ///
    /// Called when the stream closes. Returns `None` if nothing is buffered.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.split().freeze())
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
