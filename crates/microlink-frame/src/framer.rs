use std::io::{ErrorKind, Write};

use tracing::{debug, trace};

use crate::crc::{crc16, CRC16_INITIAL};
use crate::error::{FrameError, Result};
use crate::escape::{escape_into, CHUNK_SIZE, ESCAPE_NOP, START_MARKER};

/// Where the framer is in the packet sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Nothing sent yet, or the last write failed.
    Reset,
    /// Between packets.
    Idle,
    /// Mid-packet with `remaining` payload bytes still owed.
    TransmitPayload { remaining: usize },
}

impl FramerState {
    /// Short name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            FramerState::Reset => "reset",
            FramerState::Idle => "idle",
            FramerState::TransmitPayload { .. } => "transmit-payload",
        }
    }
}

/// Encodes payloads into escaped, length-prefixed, checksummed packets on any
/// `Write` channel.
///
/// A payload can be sent in one call with [`Framer::write_packet`], or
/// streamed with [`Framer::start_packet`], any number of
/// [`Framer::write_chunk`] calls, and [`Framer::finish_packet`]. Every byte
/// passes through a fixed stack buffer, so memory use does not depend on the
/// payload size.
pub struct Framer<W> {
    inner: W,
    state: FramerState,
    crc: u16,
}

impl<W: Write> Framer<W> {
    /// Create a framer in the `Reset` state; the first packet is preceded by
    /// a resync byte.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: FramerState::Reset,
            crc: CRC16_INITIAL,
        }
    }

    /// Send a whole payload as one packet.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.start_packet(payload.len())?;
        self.write_chunk(payload)?;
        self.finish_packet()
    }

    /// Emit the start marker and length field for a `payload_len`-byte packet.
    ///
    /// Calling this mid-packet abandons the partial packet; the peer drops it
    /// when it sees the new start marker.
    pub fn start_packet(&mut self, payload_len: usize) -> Result<()> {
        let wire_len = u32::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge {
            size: payload_len,
            max: u32::MAX as usize,
        })?;

        match self.state {
            FramerState::Reset => {
                trace!("sending resync byte");
                self.emit(&[ESCAPE_NOP], false, false)?;
            }
            FramerState::TransmitPayload { remaining } => {
                debug!(remaining, "abandoning partially sent packet");
            }
            FramerState::Idle => {}
        }

        self.crc = CRC16_INITIAL;
        self.emit(&START_MARKER, false, true)?;
        self.emit(&wire_len.to_le_bytes(), true, true)?;

        trace!(payload_len, "packet started");
        self.state = FramerState::TransmitPayload {
            remaining: payload_len,
        };
        Ok(())
    }

    /// Emit the next part of the payload.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let remaining = match self.state {
            FramerState::TransmitPayload { remaining } => remaining,
            other => {
                return Err(FrameError::InvalidState {
                    operation: "write_chunk",
                    state: other.name(),
                })
            }
        };
        if chunk.len() > remaining {
            return Err(FrameError::ChunkTooLarge {
                size: chunk.len(),
                remaining,
            });
        }

        self.emit(chunk, true, true)?;
        self.state = FramerState::TransmitPayload {
            remaining: remaining - chunk.len(),
        };
        Ok(())
    }

    /// Emit the checksum and flush the channel.
    pub fn finish_packet(&mut self) -> Result<()> {
        match self.state {
            FramerState::TransmitPayload { remaining: 0 } => {}
            FramerState::TransmitPayload { remaining } => {
                return Err(FrameError::PayloadIncomplete { remaining })
            }
            other => {
                return Err(FrameError::InvalidState {
                    operation: "finish_packet",
                    state: other.name(),
                })
            }
        }

        let crc = self.crc;
        self.emit(&crc.to_le_bytes(), true, false)?;
        if let Err(err) = self.flush() {
            self.state = FramerState::Reset;
            return Err(err);
        }

        trace!(crc, "packet finished");
        self.state = FramerState::Idle;
        Ok(())
    }

    /// Forget any packet in progress. The next packet gets a resync byte.
    pub fn reset(&mut self) {
        self.state = FramerState::Reset;
    }

    /// Current framer state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Flush the underlying channel.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying channel.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the framer and return the inner channel.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write `data` (optionally escaped) and fold the bytes actually placed on
    /// the wire into the checksum. Any failure drops the framer to `Reset`.
    fn emit(&mut self, mut data: &[u8], escape: bool, update_crc: bool) -> Result<()> {
        while !data.is_empty() {
            let mut buf = [0u8; CHUNK_SIZE];
            let (consumed, produced) = if escape {
                escape_into(data, &mut buf)
            } else {
                let n = data.len().min(CHUNK_SIZE);
                buf[..n].copy_from_slice(&data[..n]);
                (n, n)
            };

            if let Err(err) = self.write_all_raw(&buf[..produced]) {
                debug!(error = %err, "channel write failed; framer reset");
                self.state = FramerState::Reset;
                return Err(err);
            }
            if update_crc {
                self.crc = crc16(&buf[..produced], Some(self.crc));
            }
            data = &data[consumed..];
        }
        Ok(())
    }

    fn write_all_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }
}

impl<W> std::fmt::Debug for Framer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("state", &self.state)
            .field("crc", &format_args!("{:#06x}", self.crc))
            .finish_non_exhaustive()
    }
}
