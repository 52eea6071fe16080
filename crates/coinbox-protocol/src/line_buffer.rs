//! Reassembly of device lines split across reads.
//!
//! A non-blocking read returns whatever the serial driver has buffered, which
//! can end in the middle of a line:
//!
//! ```text
//! read 1: "HEARTBEAT\nCOIN:1"
//! read 2: "0.00\n"
//! ```
//!
//! Parsing each read on its own would credit `COIN:1` and drop `0.00`.
//! [`LineBuffer`] holds the unterminated tail until its newline arrives.
//!
//! # Usage
//!
//! ```
//! use coinbox_protocol::{HardwareEvent, LineBuffer};
//!
//! let mut buffer = LineBuffer::new();
//!
//! buffer.feed(b"HEARTBEAT\nCOIN:1");
//! assert_eq!(buffer.drain_events(), vec![HardwareEvent::Heartbeat]);
//!
//! buffer.feed(b"0.00\n");
//! let events = buffer.drain_events();
//! assert_eq!(events.len(), 1);
//! assert!(events[0].is_coin());
//! ```

use crate::{HardwareEvent, MessageParser};
use coinbox_core::constants::LINE_TERMINATOR;
use std::collections::VecDeque;
use tracing::warn;

/// Longest unterminated tail kept between reads.
///
/// Device lines are a few dozen bytes; a tail this long means the line
/// terminator was lost and the bytes are noise.
const MAX_PENDING_BYTES: usize = 4 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            lines: VecDeque::new(),
        }
    }

    /// Append raw bytes and split off every completed line.
    pub fn feed(&mut self, bytes: &[u8]) {
        let terminator = LINE_TERMINATOR as u8;

        for chunk in bytes.split_inclusive(|b| *b == terminator) {
            self.pending.extend_from_slice(chunk);

            if chunk.last() == Some(&terminator) {
                let line = std::mem::take(&mut self.pending);
                self.lines.push_back(line);
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            warn!(
                bytes = self.pending.len(),
                "Discarding unterminated device input"
            );
            self.pending.clear();
        }
    }

    /// Number of complete lines waiting to be parsed.
    pub fn lines_available(&self) -> usize {
        self.lines.len()
    }

    /// Bytes of the unterminated tail.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Parse and remove every complete line.
    ///
    /// Malformed lines are dropped the same way
    /// [`MessageParser::parse_buffer`] drops them.
    pub fn drain_events(&mut self) -> Vec<HardwareEvent> {
        let mut complete = Vec::new();
        for line in self.lines.drain(..) {
            complete.extend_from_slice(&line);
        }

        if complete.is_empty() {
            return Vec::new();
        }

        MessageParser::parse_buffer(&complete)
    }

    /// Discard everything, including the unterminated tail.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.lines.clear();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
