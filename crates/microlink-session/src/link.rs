use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::Bytes;
use microlink_frame::{Buffer, FrameError, Framer, Unframer};
use microlink_transport::TransportError;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{Result, SessionError};
use crate::header::{PacketType, SessionHeader};
use crate::session::{PacketHandler, Session, SessionState};

/// A packet delivered by the session, detached from the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub session_id: u16,
    pub payload: Bytes,
}

/// [`PacketHandler`] that queues delivered packets for the caller's loop.
#[derive(Debug, Default)]
pub struct InboundQueue {
    packets: VecDeque<Packet>,
}

impl InboundQueue {
    pub fn pop(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl PacketHandler for InboundQueue {
    fn on_packet(&mut self, header: SessionHeader, payload: &mut Buffer) {
        trace!(
            packet_type = %header.packet_type,
            len = payload.size(),
            "packet queued"
        );
        self.packets.push_back(Packet {
            packet_type: header.packet_type,
            session_id: header.session_id,
            payload: Bytes::copy_from_slice(payload.as_slice()),
        });
    }
}

/// Draw a random nonzero nonce.
pub fn random_nonce() -> u8 {
    rand::rng().random_range(1..=u8::MAX)
}

/// One end of a physical link: a read half feeding an [`Unframer`], and a
/// [`Session`] writing through a [`Framer`] on the write half.
///
/// Everything runs on the caller's thread. Reads happen only inside
/// [`Link::poll`] and the waits built on it; delivered packets are queued and
/// handed out by [`Link::recv`] / [`Link::try_recv`], so replies are always
/// sent from the caller's loop.
///
/// Deadlines are checked between reads. On channels without a read timeout
/// (pipes, device nodes) a silent peer blocks the wait until data arrives.
pub struct Link<R, W> {
    reader: R,
    unframer: Unframer,
    buffer: Buffer,
    session: Session<W, InboundQueue>,
    read_buf: Vec<u8>,
    config: LinkConfig,
}

impl<R: Read, W: Write> Link<R, W> {
    pub fn new(reader: R, writer: W, config: LinkConfig) -> Self {
        let nonce = config.initial_nonce.unwrap_or_else(random_nonce);
        Self {
            reader,
            unframer: Unframer::new(),
            buffer: Buffer::new(config.max_packet_size),
            session: Session::new(nonce, Framer::new(writer), InboundQueue::default()),
            read_buf: vec![0u8; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Push raw channel bytes through the unframer into the session.
    pub fn feed(&mut self, data: &[u8]) {
        let mut rest = data;
        while !rest.is_empty() {
            let mut receiver = self.session.receiver(&mut self.buffer);
            match self.unframer.write(rest, &mut receiver) {
                Ok(_) => break,
                Err(FrameError::Sink { consumed, .. }) if consumed > 0 => {
                    debug!(
                        max_packet_size = self.config.max_packet_size,
                        "oversized packet dropped"
                    );
                    rest = &rest[consumed..];
                }
                Err(err) => {
                    warn!(error = %err, "unframer stopped; input discarded");
                    break;
                }
            }
        }
    }

    /// Do one read from the channel and feed it. Returns the bytes read; a
    /// read timeout counts as zero.
    pub fn poll(&mut self) -> Result<usize> {
        let n = match self.reader.read(&mut self.read_buf) {
            Ok(0) => {
                return Err(SessionError::Disconnected(
                    "channel closed by peer".to_string(),
                ))
            }
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                return Ok(0)
            }
            Err(err) => return Err(TransportError::Io(err).into()),
        };

        // `feed` needs all of `self`, so lend it the read buffer by value.
        let chunk = std::mem::take(&mut self.read_buf);
        self.feed(&chunk[..n]);
        self.read_buf = chunk;
        Ok(n)
    }

    /// Send `StartSession` without waiting for the reply.
    pub fn start_session(&mut self) -> Result<()> {
        self.session.start_session()
    }

    /// Initiate a handshake and poll until it completes, re-sending
    /// `StartSession` every `handshake_retry_interval`.
    pub fn establish(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.session.start_session()?;
        let mut last_attempt = Instant::now();

        while !self.session.is_established() {
            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::Timeout(timeout));
            }
            if now.duration_since(last_attempt) >= self.config.handshake_retry_interval {
                debug!(state = %self.session.state(), "no handshake reply; retrying");
                self.session.start_session()?;
                last_attempt = now;
            }
            self.poll()?;
        }

        info!(
            session_id = format_args!("{:#06x}", self.session.session_id()),
            "link established"
        );
        Ok(())
    }

    /// Poll until the peer completes a handshake.
    pub fn wait_established(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.session.is_established() {
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout(timeout));
            }
            self.poll()?;
        }
        Ok(())
    }

    /// Send a payload on the established session.
    pub fn send(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        self.session.send(packet_type, payload)
    }

    /// Block until a packet is delivered or `recv_timeout` elapses.
    pub fn recv(&mut self) -> Result<Packet> {
        let deadline = self.config.recv_timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(packet) = self.session.handler_mut().pop() {
                return Ok(packet);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, self.config.recv_timeout) {
                if Instant::now() >= deadline {
                    return Err(SessionError::Timeout(timeout));
                }
            }
            self.poll()?;
        }
    }

    /// Take a queued packet without reading the channel.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.session.handler_mut().pop()
    }

    /// Packets delivered but not yet taken.
    pub fn pending(&self) -> usize {
        self.session.handler().len()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_id(&self) -> u16 {
        self.session.session_id()
    }

    pub fn is_established(&self) -> bool {
        self.session.is_established()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Borrow the session, e.g. for streamed sends.
    pub fn session_mut(&mut self) -> &mut Session<W, InboundQueue> {
        &mut self.session
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

impl<R, W> std::fmt::Debug for Link<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("session", &self.session)
            .field("unframer", &self.unframer.state())
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}
