//! Byte-at-a-time frame parser.
//!
//! Turns the inbound byte stream into verified command lines. Escapes and
//! run-length repeats are resolved while accumulating, so a completed line is
//! the literal command text.

use tracing::trace;

use crate::MAX_PACKET_LENGTH;
use crate::codec::{ESCAPE, ESCAPE_XOR, RUN_LENGTH, hex_value};

/// Parser position within a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for `$`. Initial state and recovery target.
    #[default]
    Idle,
    /// Collecting body bytes.
    Accumulating,
    /// Previous byte was `}`.
    EscapeNext,
    /// Previous byte was `*`.
    RunLength,
    /// Previous byte was `#`.
    ChecksumHigh,
    /// High checksum digit received.
    ChecksumLow,
}

/// Outcome of a completed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Checksum matched; the line is available from [`FrameParser::line`].
    Ack,
    /// Checksum mismatch; the line was discarded.
    Nak,
}

/// Frame parser with a bounded line buffer.
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    line: Vec<u8>,
    capacity: usize,
    running_sum: u8,
    expected_checksum: u8,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Parser sized for [`MAX_PACKET_LENGTH`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_PACKET_LENGTH)
    }

    /// Parser whose line holds at most `capacity - 1` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: ParserState::Idle,
            line: Vec::with_capacity(capacity),
            capacity,
            running_sum: 0,
            expected_checksum: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ParserState {
        self.state
    }

    /// Force the parser into `state`, e.g. the state a dispatched command returns.
    pub const fn set_state(&mut self, state: ParserState) {
        self.state = state;
    }

    /// The most recently completed (or in-progress) command line.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    /// Drop any partial frame and return to [`ParserState::Idle`].
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.line.clear();
        self.running_sum = 0;
        self.expected_checksum = 0;
    }

    fn is_full(&self) -> bool {
        self.line.len() >= self.capacity.saturating_sub(1)
    }

    fn accumulate(&mut self, byte: u8) {
        self.running_sum = self.running_sum.wrapping_add(byte);
    }

    /// Advance the state machine by one byte.
    ///
    /// Returns a verdict once the second checksum digit has been consumed.
    /// The parser is back in [`ParserState::Idle`] after either verdict.
    pub fn feed(&mut self, byte: u8) -> Option<Verdict> {
        match self.state {
            ParserState::Idle => {
                if byte == b'$' {
                    self.line.clear();
                    self.running_sum = 0;
                    self.state = ParserState::Accumulating;
                }
            }
            ParserState::Accumulating => match byte {
                ESCAPE => {
                    self.state = ParserState::EscapeNext;
                    self.accumulate(byte);
                }
                RUN_LENGTH => {
                    self.state = ParserState::RunLength;
                    self.accumulate(byte);
                }
                b'#' => self.state = ParserState::ChecksumHigh,
                _ if self.is_full() => {
                    trace!(len = self.line.len(), "line buffer overflow, dropping frame");
                    self.state = ParserState::Idle;
                }
                _ => {
                    self.line.push(byte);
                    self.accumulate(byte);
                }
            },
            ParserState::EscapeNext => {
                if byte == b'#' {
                    // Unterminated escape; go straight to the checksum.
                    self.state = ParserState::ChecksumHigh;
                } else if self.is_full() {
                    trace!(len = self.line.len(), "line buffer overflow, dropping frame");
                    self.state = ParserState::Idle;
                } else {
                    self.line.push(byte ^ ESCAPE_XOR);
                    self.accumulate(byte);
                    self.state = ParserState::Accumulating;
                }
            }
            ParserState::RunLength => self.repeat(byte),
            ParserState::ChecksumHigh => match hex_value(byte) {
                Some(high) => {
                    self.expected_checksum = high << 4;
                    self.state = ParserState::ChecksumLow;
                }
                None => self.state = ParserState::Accumulating,
            },
            ParserState::ChecksumLow => {
                let Some(low) = hex_value(byte) else {
                    self.state = ParserState::Accumulating;
                    return None;
                };
                self.expected_checksum |= low;
                self.state = ParserState::Idle;
                if self.expected_checksum == self.running_sum {
                    return Some(Verdict::Ack);
                }
                trace!(
                    expected = self.expected_checksum,
                    actual = self.running_sum,
                    "checksum mismatch"
                );
                self.line.clear();
                return Some(Verdict::Nak);
            }
        }
        None
    }

    fn repeat(&mut self, byte: u8) {
        self.state = ParserState::Accumulating;
        if byte < b' ' {
            // Invalid count; the marker is dropped.
            return;
        }
        let count = usize::from(byte - b' ') + 3;
        if self.line.len() + count >= self.capacity.saturating_sub(1) {
            trace!(len = self.line.len(), count, "run-length overflow, dropping frame");
            self.state = ParserState::Idle;
            return;
        }
        let Some(&last) = self.line.last() else {
            return;
        };
        self.line.resize(self.line.len() + count, last);
        self.accumulate(byte);
    }
}
