use tracing::{debug, trace, warn};

use crate::crc::crc16;
use crate::error::{FrameError, Result};
use crate::escape::{
    CHUNK_SIZE, CRC_FIELD_SIZE, ESCAPE_NOP, ESCAPE_START, LENGTH_FIELD_SIZE, PACKET_START,
    START_MARKER,
};
use crate::sink::PacketSink;

/// Which field of the packet the unframer is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnframerState {
    /// Scanning for the start marker.
    FindStart,
    /// Collecting the 4-byte length field.
    FindLength,
    /// Forwarding payload bytes to the sink.
    FindCrc,
    /// Collecting the 2-byte checksum.
    FindCrcEnd,
}

/// Why a packet in flight was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortReason {
    /// A start marker appeared mid-packet.
    Resync,
    /// `ESCAPE_START` followed by a byte with no meaning.
    InvalidEscape(u8),
}

enum Outcome {
    Continue,
    Abort(AbortReason),
    SinkFailed(FrameError),
}

struct Step {
    consumed: usize,
    outcome: Outcome,
}

impl Step {
    fn advance(consumed: usize) -> Self {
        Self {
            consumed,
            outcome: Outcome::Continue,
        }
    }
}

/// Push-based packet decoder.
///
/// Feed raw channel bytes with [`Unframer::write`] as they arrive, in slices of
/// any size. Decoding state survives between calls, so a field split across
/// reads decodes the same as one delivered whole. Payload bytes reach the sink
/// before the checksum is known; the sink learns the verdict through
/// [`PacketSink::packet_done`].
///
/// Malformed input never fails the call. A bad escape or an unexpected start
/// marker abandons the packet in flight and decoding resumes at the next start
/// marker.
#[derive(Debug)]
pub struct Unframer {
    state: UnframerState,
    saw_escape: bool,
    crc: u16,
    scratch: [u8; CHUNK_SIZE],
    filled: usize,
    remaining: usize,
}

impl Default for Unframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Unframer {
    pub fn new() -> Self {
        Self {
            state: UnframerState::FindStart,
            saw_escape: false,
            crc: 0,
            scratch: [0u8; CHUNK_SIZE],
            filled: 0,
            remaining: 0,
        }
    }

    /// Decode `data`, forwarding payload bytes and packet verdicts to `sink`.
    ///
    /// Returns the number of input bytes consumed, which is always
    /// `data.len()`. If the sink rejects payload bytes the packet is abandoned
    /// and [`FrameError::Sink`] reports how much of `data` was consumed; the
    /// caller may resume with the rest.
    pub fn write<S: PacketSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> Result<usize> {
        let mut pos = 0;
        while pos < data.len() {
            let input = &data[pos..];
            let step = match self.state {
                UnframerState::FindStart => self.find_start(input),
                UnframerState::FindLength => self.find_length(input),
                UnframerState::FindCrc => self.find_crc(input, sink),
                UnframerState::FindCrcEnd => self.find_crc_end(input, sink),
            };
            pos += step.consumed;

            match step.outcome {
                Outcome::Continue => {}
                Outcome::Abort(AbortReason::Resync) => {
                    debug!(state = ?self.state, "start marker mid-packet; resynchronizing");
                    self.abort(sink);
                }
                Outcome::Abort(AbortReason::InvalidEscape(byte)) => {
                    warn!(
                        state = ?self.state,
                        byte = format_args!("{byte:#04x}"),
                        "invalid escape sequence; packet dropped"
                    );
                    self.abort(sink);
                }
                Outcome::SinkFailed(source) => {
                    warn!(error = %source, "packet sink rejected payload; packet dropped");
                    self.abort(sink);
                    return Err(FrameError::Sink {
                        consumed: pos,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(pos)
    }

    /// Abandon any packet in flight without notifying a sink.
    pub fn reset(&mut self) {
        self.state = UnframerState::FindStart;
        self.saw_escape = false;
        self.filled = 0;
        self.remaining = 0;
    }

    /// Current decoder state.
    pub fn state(&self) -> UnframerState {
        self.state
    }

    /// Lower bound on the wire bytes needed to finish the current field.
    ///
    /// Escaped bytes take two wire bytes, so more input may be needed.
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            UnframerState::FindStart if self.saw_escape => 1,
            UnframerState::FindStart => START_MARKER.len(),
            UnframerState::FindLength => LENGTH_FIELD_SIZE - self.filled,
            UnframerState::FindCrc => self.remaining,
            UnframerState::FindCrcEnd => CRC_FIELD_SIZE - self.filled,
        }
    }

    fn abort<S: PacketSink + ?Sized>(&mut self, sink: &mut S) {
        // `saw_escape` is left as is: after a resync it is set, so the
        // `PACKET_START` still in the input opens the next packet.
        self.state = UnframerState::FindStart;
        self.filled = 0;
        self.remaining = 0;
        sink.packet_aborted();
    }

    fn find_start(&mut self, input: &[u8]) -> Step {
        for (i, &c) in input.iter().enumerate() {
            if c == ESCAPE_START {
                self.saw_escape = !self.saw_escape;
            } else if c == PACKET_START && self.saw_escape {
                self.saw_escape = false;
                self.crc = crc16(&START_MARKER, None);
                self.state = UnframerState::FindLength;
                trace!("start marker found");
                return Step::advance(i + 1);
            } else {
                self.saw_escape = false;
            }
        }
        Step::advance(input.len())
    }

    fn find_length(&mut self, input: &[u8]) -> Step {
        let step = self.consume(input, LENGTH_FIELD_SIZE, true);
        if matches!(step.outcome, Outcome::Continue) && self.filled == LENGTH_FIELD_SIZE {
            let mut field = [0u8; LENGTH_FIELD_SIZE];
            field.copy_from_slice(&self.scratch[..LENGTH_FIELD_SIZE]);
            self.remaining = u32::from_le_bytes(field) as usize;
            self.filled = 0;
            self.state = UnframerState::FindCrc;
            trace!(payload_len = self.remaining, "length field decoded");
        }
        step
    }

    fn find_crc<S: PacketSink + ?Sized>(&mut self, input: &[u8], sink: &mut S) -> Step {
        if self.remaining == 0 {
            self.state = UnframerState::FindCrcEnd;
            return Step::advance(0);
        }

        let want = self.remaining.min(CHUNK_SIZE);
        let step = self.consume(input, want, true);
        if self.filled > 0 && matches!(step.outcome, Outcome::Continue) {
            if let Err(err) = sink.write_all(&self.scratch[..self.filled]) {
                return Step {
                    consumed: step.consumed,
                    outcome: Outcome::SinkFailed(err),
                };
            }
            self.remaining -= self.filled;
            self.filled = 0;
            if self.remaining == 0 {
                self.state = UnframerState::FindCrcEnd;
            }
        }
        step
    }

    fn find_crc_end<S: PacketSink + ?Sized>(&mut self, input: &[u8], sink: &mut S) -> Step {
        let step = self.consume(input, CRC_FIELD_SIZE, false);
        if matches!(step.outcome, Outcome::Continue) && self.filled == CRC_FIELD_SIZE {
            let received = u16::from_le_bytes([self.scratch[0], self.scratch[1]]);
            let is_valid = received == self.crc;
            if is_valid {
                trace!("packet complete");
            } else {
                warn!(
                    expected = format_args!("{:#06x}", self.crc),
                    received = format_args!("{received:#06x}"),
                    "checksum mismatch; packet dropped"
                );
            }
            sink.packet_done(is_valid);
            self.filled = 0;
            self.state = UnframerState::FindStart;
        }
        step
    }

    /// Unescape input into the scratch buffer until it holds `field_len`
    /// bytes, the input runs out, or the packet must be abandoned.
    ///
    /// The checksum covers every raw byte consumed, escapes included. A
    /// `PACKET_START` that triggers a resync is left unconsumed.
    fn consume(&mut self, input: &[u8], field_len: usize, update_crc: bool) -> Step {
        debug_assert!(self.filled < field_len);

        let mut outcome = Outcome::Continue;
        let mut i = 0;
        while i < input.len() {
            let c = input[i];
            if self.saw_escape {
                self.saw_escape = false;
                match c {
                    PACKET_START => {
                        self.saw_escape = true;
                        outcome = Outcome::Abort(AbortReason::Resync);
                        break;
                    }
                    ESCAPE_NOP => {
                        i += 1;
                        continue;
                    }
                    ESCAPE_START => {}
                    other => {
                        i += 1;
                        outcome = Outcome::Abort(AbortReason::InvalidEscape(other));
                        break;
                    }
                }
            } else if c == ESCAPE_START {
                self.saw_escape = true;
                i += 1;
                continue;
            }

            self.scratch[self.filled] = c;
            self.filled += 1;
            i += 1;
            if self.filled == field_len {
                break;
            }
        }

        if update_crc {
            self.crc = crc16(&input[..i], Some(self.crc));
        }
        Step {
            consumed: i,
            outcome,
        }
    }
}
