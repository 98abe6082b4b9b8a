use std::io::Write;

use microlink_frame::{Buffer, FrameError, Framer, PacketSink};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::header::{PacketType, SessionHeader, HEADER_SIZE};

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session; only broadcast log messages are delivered.
    Reset,
    /// We sent `StartSession` and are waiting for the peer's reply.
    StartSessionSent,
    /// Both sides agree on the session id.
    Established,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Reset => "reset",
            SessionState::StartSessionSent => "start_session_sent",
            SessionState::Established => "established",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives packets that pass session filtering.
///
/// `payload` holds the bytes after the session header and is cleared once the
/// handler returns. Handlers run while the session is borrowed, so replies
/// must be queued and sent afterwards rather than from inside the call.
pub trait PacketHandler {
    fn on_packet(&mut self, header: SessionHeader, payload: &mut Buffer);
}

impl<F> PacketHandler for F
where
    F: FnMut(SessionHeader, &mut Buffer),
{
    fn on_packet(&mut self, header: SessionHeader, payload: &mut Buffer) {
        self(header, payload)
    }
}

/// Next handshake nonce. Never returns 0.
pub fn next_nonce(nonce: u8) -> u8 {
    let next = ((nonce << 5) | (nonce >> 5)).wrapping_add(1);
    if next == 0 {
        1
    } else {
        next
    }
}

/// Session state machine layered over a [`Framer`].
///
/// Outbound, it prefixes every payload with a [`SessionHeader`]. Inbound, it
/// sits behind an [`Unframer`](microlink_frame::Unframer) through
/// [`Session::receiver`]: `StartSession` packets drive the handshake, other
/// packets reach the [`PacketHandler`] only when their header matches the
/// established session (or they are log messages with session id 0).
///
/// The session id is negotiated from two nonces. The initiator sends its
/// nonce as the low byte with a zero high byte; the responder answers with its
/// own nonce in the high byte. Either side restarting forces the other back
/// through the handshake.
pub struct Session<W, H> {
    framer: Framer<W>,
    handler: H,
    state: SessionState,
    nonce: u8,
    session_id: u16,
}

impl<W: Write, H: PacketHandler> Session<W, H> {
    /// Create a session in `Reset`. The nonce is advanced before first use.
    pub fn new(initial_nonce: u8, framer: Framer<W>, handler: H) -> Self {
        Self {
            framer,
            handler,
            state: SessionState::Reset,
            nonce: initial_nonce,
            session_id: 0,
        }
    }

    /// Begin a handshake as initiator.
    pub fn start_session(&mut self) -> Result<()> {
        self.regenerate_nonce();
        self.session_id = u16::from(self.nonce);
        if let Err(err) = self.send_internal(PacketType::StartSession, &[]) {
            // The tentative id no longer matches any agreed session.
            self.state = SessionState::Reset;
            return Err(err);
        }
        debug!(nonce = self.nonce, "start session sent");
        self.state = SessionState::StartSessionSent;
        Ok(())
    }

    /// Send a payload on the established session.
    pub fn send(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        self.ensure_established()?;
        self.send_internal(packet_type, payload)
    }

    /// Begin a streamed packet of `payload_len` bytes (header excluded).
    pub fn start_packet(&mut self, packet_type: PacketType, payload_len: usize) -> Result<()> {
        self.ensure_established()?;
        self.start_packet_internal(packet_type, payload_len)
    }

    /// Send part of a streamed packet's payload.
    pub fn send_payload_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.framer.write_chunk(chunk)?;
        Ok(())
    }

    /// Finish a streamed packet.
    pub fn finish_packet(&mut self) -> Result<()> {
        self.framer.finish_packet()?;
        Ok(())
    }

    /// Borrow the session as the sink for an [`Unframer`](microlink_frame::Unframer),
    /// accumulating each packet in `buffer`.
    pub fn receiver<'a>(&'a mut self, buffer: &'a mut Buffer) -> SessionReceiver<'a, W, H> {
        SessionReceiver {
            session: self,
            buffer,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated (or tentative) session id.
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// Current nonce.
    pub fn nonce(&self) -> u8 {
        self.nonce
    }

    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Forget the session. The framer also resets so the next packet carries
    /// a resync byte.
    pub fn reset(&mut self) {
        self.state = SessionState::Reset;
        self.session_id = 0;
        self.framer.reset();
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn framer(&self) -> &Framer<W> {
        &self.framer
    }

    pub fn framer_mut(&mut self) -> &mut Framer<W> {
        &mut self.framer
    }

    /// Consume the session and return its framer and handler.
    pub fn into_parts(self) -> (Framer<W>, H) {
        (self.framer, self.handler)
    }

    fn ensure_established(&self) -> Result<()> {
        if self.state == SessionState::Established {
            Ok(())
        } else {
            Err(SessionError::NotEstablished)
        }
    }

    fn regenerate_nonce(&mut self) {
        self.nonce = next_nonce(self.nonce);
    }

    fn send_internal(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        self.start_packet_internal(packet_type, payload.len())?;
        self.framer.write_chunk(payload)?;
        self.framer.finish_packet()?;
        Ok(())
    }

    fn start_packet_internal(&mut self, packet_type: PacketType, payload_len: usize) -> Result<()> {
        let header = SessionHeader::new(self.session_id, packet_type);
        let total = payload_len
            .checked_add(HEADER_SIZE)
            .ok_or(FrameError::PayloadTooLarge {
                size: payload_len,
                max: u32::MAX as usize - HEADER_SIZE,
            })?;
        self.framer.start_packet(total)?;
        self.framer.write_chunk(&header.encode())?;
        Ok(())
    }

    /// Route one validated packet. `buffer` holds the whole payload,
    /// header first, and is cleared before returning.
    fn dispatch(&mut self, buffer: &mut Buffer) {
        let len = buffer.size();
        let mut raw = [0u8; HEADER_SIZE];
        if buffer.read(&mut raw) != HEADER_SIZE {
            debug!(len, "packet shorter than session header; dropped");
            buffer.clear();
            return;
        }

        let header = match SessionHeader::decode(raw) {
            Ok(header) => header,
            Err(packet_type) => {
                debug!(packet_type, "unknown packet type; dropped");
                buffer.clear();
                return;
            }
        };

        if header.packet_type == PacketType::StartSession {
            self.process_start_session(header);
        } else if header.session_id == self.session_id && self.is_established() {
            self.handler.on_packet(header, buffer);
        } else if header.packet_type == PacketType::LogMessage && header.session_id == 0 {
            self.handler.on_packet(header, buffer);
        } else {
            debug!(
                session_id = header.session_id,
                expected = self.session_id,
                state = %self.state,
                packet_type = %header.packet_type,
                "packet not for this session; dropped"
            );
        }

        buffer.clear();
    }

    fn process_start_session(&mut self, header: SessionHeader) {
        let is_request = header.initiator_nonce() != 0 && header.responder_nonce() == 0;
        match self.state {
            SessionState::Reset => {
                if is_request {
                    self.reply_to_start(header);
                } else {
                    self.restart_handshake();
                }
            }
            SessionState::StartSessionSent => {
                if header.initiator_nonce() == self.nonce {
                    self.session_id = header.session_id;
                    self.state = SessionState::Established;
                    info!(
                        session_id = format_args!("{:#06x}", self.session_id),
                        "session established"
                    );
                } else {
                    self.restart_handshake();
                }
            }
            SessionState::Established => {
                if header.session_id != self.session_id && header.responder_nonce() == 0 {
                    self.reply_to_start(header);
                } else {
                    // A repeat of our own id (or a stray reply) drops the session.
                    info!(
                        session_id = format_args!("{:#06x}", header.session_id),
                        "unexpected start session while established; session reset"
                    );
                    self.state = SessionState::Reset;
                }
            }
        }
    }

    fn reply_to_start(&mut self, header: SessionHeader) {
        self.regenerate_nonce();
        self.session_id = u16::from(header.initiator_nonce()) | (u16::from(self.nonce) << 8);
        match self.send_internal(PacketType::StartSession, &[]) {
            Ok(()) => {
                self.state = SessionState::Established;
                info!(
                    session_id = format_args!("{:#06x}", self.session_id),
                    "session established"
                );
            }
            Err(err) => {
                warn!(error = %err, "failed to answer start session; session reset");
                self.state = SessionState::Reset;
            }
        }
    }

    fn restart_handshake(&mut self) {
        if let Err(err) = self.start_session() {
            warn!(error = %err, "failed to restart handshake; session reset");
        }
    }
}

impl<W, H> std::fmt::Debug for Session<W, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("nonce", &self.nonce)
            .field("session_id", &format_args!("{:#06x}", self.session_id))
            .field("framer", &self.framer)
            .finish_non_exhaustive()
    }
}

/// [`PacketSink`] that collects a packet into a [`Buffer`] and hands it to the
/// [`Session`] once the checksum passes.
pub struct SessionReceiver<'a, W, H> {
    session: &'a mut Session<W, H>,
    buffer: &'a mut Buffer,
}

impl<W: Write, H: PacketHandler> PacketSink for SessionReceiver<'_, W, H> {
    fn write_all(&mut self, data: &[u8]) -> microlink_frame::Result<()> {
        if data.len() > self.buffer.free() {
            let available = self.buffer.free();
            self.buffer.clear();
            return Err(FrameError::BufferFull {
                size: data.len(),
                available,
            });
        }
        self.buffer.write(data);
        Ok(())
    }

    fn packet_done(&mut self, is_valid: bool) {
        if is_valid {
            self.session.dispatch(self.buffer);
        } else {
            self.buffer.clear();
        }
    }

    fn packet_aborted(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use microlink_frame::{FramerState, PacketCollector, Unframer};

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        packets: Vec<(SessionHeader, Vec<u8>)>,
    }

    impl PacketHandler for Recorder {
        fn on_packet(&mut self, header: SessionHeader, payload: &mut Buffer) {
            self.packets.push((header, payload.as_slice().to_vec()));
        }
    }

    /// One end of an in-memory link: a session plus its receive path.
    struct Endpoint {
        session: Session<Vec<u8>, Recorder>,
        unframer: Unframer,
        buffer: Buffer,
    }

    impl Endpoint {
        fn new(nonce: u8) -> Self {
            Self {
                session: Session::new(nonce, Framer::new(Vec::new()), Recorder::default()),
                unframer: Unframer::new(),
                buffer: Buffer::new(256),
            }
        }

        fn take_output(&mut self) -> Vec<u8> {
            std::mem::take(self.session.framer_mut().get_mut())
        }

        fn feed(&mut self, wire: &[u8]) {
            let mut receiver = self.session.receiver(&mut self.buffer);
            self.unframer
                .write(wire, &mut receiver)
                .expect("receive buffer should hold test packets");
        }

        fn packets(&self) -> &[(SessionHeader, Vec<u8>)] {
            &self.session.handler().packets
        }
    }

    /// Move everything `from` has written into `to`. Returns false if idle.
    fn pump(from: &mut Endpoint, to: &mut Endpoint) -> bool {
        let wire = from.take_output();
        if wire.is_empty() {
            return false;
        }
        to.feed(&wire);
        true
    }

    fn run_until_quiet(a: &mut Endpoint, b: &mut Endpoint) -> usize {
        let mut exchanges = 0;
        loop {
            let moved_ab = pump(a, b);
            let moved_ba = pump(b, a);
            if !moved_ab && !moved_ba {
                return exchanges;
            }
            exchanges += 1;
            assert!(exchanges < 16, "handshake did not settle");
        }
    }

    /// A raw packet with an arbitrary header, as a peer would send it.
    fn raw_packet(header: SessionHeader, payload: &[u8]) -> Vec<u8> {
        let mut body = header.encode().to_vec();
        body.extend_from_slice(payload);
        microlink_frame::encode_packet(&body)
            .expect("encoding to memory should succeed")
            .to_vec()
    }

    fn decode_headers(wire: &[u8]) -> Vec<SessionHeader> {
        let mut unframer = Unframer::new();
        let mut sink = PacketCollector::new();
        unframer.write(wire, &mut sink).expect("collector should accept");
        sink.drain()
            .map(|p| SessionHeader::parse(&p).expect("packet should carry a header"))
            .collect()
    }

    #[test]
    fn nonce_sequence() {
        assert_eq!(next_nonce(0), 1);
        assert_eq!(next_nonce(1), 0x21);
        assert_eq!(next_nonce(0xFF), 0xE8);
        for n in 0..=u8::MAX {
            assert_ne!(next_nonce(n), 0);
        }
    }

    #[test]
    fn start_session_sends_nonce_as_low_byte() {
        let mut a = Endpoint::new(1);
        a.session.start_session().unwrap();
        assert_eq!(a.session.state(), SessionState::StartSessionSent);
        assert_eq!(a.session.nonce(), 0x21);

        let headers = decode_headers(&a.take_output());
        assert_eq!(
            headers,
            vec![SessionHeader::new(0x0021, PacketType::StartSession)]
        );
    }

    #[test]
    fn handshake_converges_when_a_initiates() {
        let mut a = Endpoint::new(7);
        let mut b = Endpoint::new(99);

        a.session.start_session().unwrap();
        run_until_quiet(&mut a, &mut b);

        assert_eq!(a.session.state(), SessionState::Established);
        assert_eq!(b.session.state(), SessionState::Established);
        assert_eq!(a.session.session_id(), b.session.session_id());
        assert_eq!(
            a.session.session_id() & 0xFF,
            u16::from(a.session.nonce()),
            "low byte is the initiator's nonce"
        );
        assert_eq!(a.session.session_id() >> 8, u16::from(b.session.nonce()));
    }

    #[test]
    fn handshake_converges_when_b_initiates() {
        let mut a = Endpoint::new(7);
        let mut b = Endpoint::new(99);

        b.session.start_session().unwrap();
        let exchanges = run_until_quiet(&mut a, &mut b);

        assert!(exchanges <= 2);
        assert!(a.session.is_established());
        assert!(b.session.is_established());
        assert_eq!(a.session.session_id(), b.session.session_id());
    }

    #[test]
    fn traffic_flows_after_handshake() {
        let mut a = Endpoint::new(3);
        let mut b = Endpoint::new(200);
        a.session.start_session().unwrap();
        run_until_quiet(&mut a, &mut b);

        a.session
            .send(PacketType::NormalTraffic, &[0xFF, 0xFD, 0x00])
            .unwrap();
        pump(&mut a, &mut b);

        let id = a.session.session_id();
        assert_eq!(
            b.packets(),
            &[(
                SessionHeader::new(id, PacketType::NormalTraffic),
                vec![0xFF, 0xFD, 0x00]
            )]
        );
    }

    #[test]
    fn send_before_established_is_rejected() {
        let mut a = Endpoint::new(3);
        let err = a.session.send(PacketType::NormalTraffic, b"x").unwrap_err();
        assert!(matches!(err, SessionError::NotEstablished));
        assert!(a.take_output().is_empty());

        assert!(matches!(
            a.session.start_packet(PacketType::NormalTraffic, 1),
            Err(SessionError::NotEstablished)
        ));
    }

    #[test]
    fn streamed_send_matches_single_call() {
        let mut a = Endpoint::new(3);
        let mut b = Endpoint::new(200);
        a.session.start_session().unwrap();
        run_until_quiet(&mut a, &mut b);

        a.session.send(PacketType::NormalTraffic, b"hello world").unwrap();
        let whole = a.take_output();

        a.session.start_packet(PacketType::NormalTraffic, 11).unwrap();
        a.session.send_payload_chunk(b"hello").unwrap();
        a.session.send_payload_chunk(b" world").unwrap();
        a.session.finish_packet().unwrap();
        assert_eq!(a.take_output(), whole);
    }

    #[test]
    fn mismatched_reply_resends_start_session() {
        let mut a = Endpoint::new(1);
        a.session.start_session().unwrap();
        let first_nonce = a.session.nonce();
        a.take_output();

        let stray_id = u16::from(first_nonce.wrapping_add(1)) | 0x4400;
        let stray = SessionHeader::new(stray_id, PacketType::StartSession);
        a.feed(&raw_packet(stray, &[]));

        assert_eq!(a.session.state(), SessionState::StartSessionSent);
        assert_ne!(a.session.nonce(), first_nonce);
        let headers = decode_headers(&a.take_output());
        assert_eq!(
            headers,
            vec![SessionHeader::new(
                u16::from(a.session.nonce()),
                PacketType::StartSession
            )]
        );
    }

    #[test]
    fn broadcast_log_delivered_in_reset() {
        let mut a = Endpoint::new(1);
        a.feed(&raw_packet(
            SessionHeader::new(0, PacketType::LogMessage),
            b"booting",
        ));

        assert_eq!(a.session.state(), SessionState::Reset);
        assert_eq!(
            a.packets(),
            &[(SessionHeader::new(0, PacketType::LogMessage), b"booting".to_vec())]
        );
        assert!(a.buffer.is_empty());
    }

    #[test]
    fn traffic_without_session_is_dropped() {
        let mut a = Endpoint::new(1);
        a.feed(&raw_packet(
            SessionHeader::new(0, PacketType::NormalTraffic),
            b"early",
        ));
        a.feed(&raw_packet(
            SessionHeader::new(0x1234, PacketType::LogMessage),
            b"stale log",
        ));
        assert!(a.packets().is_empty());
        assert!(a.buffer.is_empty());
    }

    #[test]
    fn traffic_for_other_session_is_dropped() {
        let mut a = Endpoint::new(3);
        let mut b = Endpoint::new(200);
        a.session.start_session().unwrap();
        run_until_quiet(&mut a, &mut b);

        let stale = a.session.session_id().wrapping_add(1);
        b.feed(&raw_packet(
            SessionHeader::new(stale, PacketType::NormalTraffic),
            b"old",
        ));
        assert!(b.packets().is_empty());
    }

    #[test]
    fn runt_and_unknown_type_packets_are_dropped() {
        let mut a = Endpoint::new(1);
        a.feed(&microlink_frame::encode_packet(&[0x00, 0x00]).unwrap());
        a.feed(&microlink_frame::encode_packet(&[0x00, 0x00, 0x09, 0x01]).unwrap());
        assert!(a.packets().is_empty());
        assert_eq!(a.session.state(), SessionState::Reset);
        assert!(a.buffer.is_empty());
    }

    #[test]
    fn reset_side_answers_request() {
        let mut b = Endpoint::new(10);
        b.feed(&raw_packet(
            SessionHeader::new(0x0055, PacketType::StartSession),
            &[],
        ));

        assert_eq!(b.session.state(), SessionState::Established);
        let expected_id = 0x0055 | (u16::from(b.session.nonce()) << 8);
        assert_eq!(b.session.session_id(), expected_id);
        assert_eq!(
            decode_headers(&b.take_output()),
            vec![SessionHeader::new(expected_id, PacketType::StartSession)]
        );
    }

    #[test]
    fn reset_side_restarts_on_reply_it_did_not_ask_for() {
        let mut b = Endpoint::new(10);
        b.feed(&raw_packet(
            SessionHeader::new(0x3355, PacketType::StartSession),
            &[],
        ));
        assert_eq!(b.session.state(), SessionState::StartSessionSent);
        assert_eq!(b.session.session_id(), u16::from(b.session.nonce()));
    }

    #[test]
    fn established_side_rehandshakes_on_new_request() {
        let mut a = Endpoint::new(3);
        let mut b = Endpoint::new(200);
        a.session.start_session().unwrap();
        run_until_quiet(&mut a, &mut b);
        let old_id = b.session.session_id();

        // Peer rebooted and starts over.
        let mut rebooted = Endpoint::new(90);
        rebooted.session.start_session().unwrap();
        let request = rebooted.take_output();
        b.feed(&request);

        assert!(b.session.is_established());
        assert_ne!(b.session.session_id(), old_id);

        pump(&mut b, &mut rebooted);
        assert!(rebooted.session.is_established());
        assert_eq!(rebooted.session.session_id(), b.session.session_id());
    }

    #[test]
    fn repeated_reply_drops_established_session() {
        let mut a = Endpoint::new(3);
        let mut b = Endpoint::new(200);
        a.session.start_session().unwrap();
        pump(&mut a, &mut b);
        let reply = b.take_output();
        a.feed(&reply);
        assert!(a.session.is_established());

        // Second copy of the same reply, minus the resync byte.
        a.feed(&reply[1..]);
        assert_eq!(a.session.state(), SessionState::Reset);
    }

    #[test]
    fn corrupted_packet_never_dispatches() {
        let mut a = Endpoint::new(1);
        let mut wire = raw_packet(SessionHeader::new(0, PacketType::LogMessage), b"log");
        let last = wire.len() - 1;
        wire[last] ^= 0x80;
        a.feed(&wire);
        assert!(a.packets().is_empty());
        assert!(a.buffer.is_empty());
    }

    #[test]
    fn oversized_packet_is_dropped_and_buffer_cleared() {
        let mut a = Endpoint::new(1);
        let big = raw_packet(SessionHeader::new(0, PacketType::LogMessage), &[0x41; 400]);
        let mut receiver = a.session.receiver(&mut a.buffer);
        let err = a.unframer.write(&big, &mut receiver).unwrap_err();
        assert!(matches!(err, FrameError::Sink { .. }));
        assert!(a.buffer.is_empty());

        a.feed(&raw_packet(SessionHeader::new(0, PacketType::LogMessage), b"ok"));
        assert_eq!(a.packets().len(), 1);
    }

    #[test]
    fn failed_handshake_reply_resets_without_panicking() {
        struct BrokenLink;
        impl io::Write for BrokenLink {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut session = Session::new(5, Framer::new(BrokenLink), Recorder::default());
        let mut buffer = Buffer::new(64);
        let mut unframer = Unframer::new();
        let request = raw_packet(SessionHeader::new(0x0042, PacketType::StartSession), &[]);
        unframer
            .write(&request, &mut session.receiver(&mut buffer))
            .unwrap();

        assert_eq!(session.state(), SessionState::Reset);
        assert!(session.start_session().is_err());
        assert_eq!(session.state(), SessionState::Reset);
    }

    fn established_endpoint() -> Endpoint {
        let mut a = Endpoint::new(1);
        a.session.start_session().unwrap();
        a.take_output();
        a.feed(&raw_packet(
            SessionHeader::new(0x5521, PacketType::StartSession),
            &[],
        ));
        assert!(a.session.is_established());
        a.take_output();
        a
    }

    #[test]
    fn oversized_streamed_packet_is_rejected_before_any_output() {
        let mut a = established_endpoint();

        let err = a
            .session
            .start_packet(PacketType::NormalTraffic, usize::MAX)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Frame(FrameError::PayloadTooLarge { .. })
        ));

        let err = a
            .session
            .start_packet(PacketType::NormalTraffic, u32::MAX as usize)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Frame(FrameError::PayloadTooLarge { .. })
        ));

        assert!(a.take_output().is_empty());
        assert_eq!(a.session.framer().state(), FramerState::Idle);
        assert_eq!(a.session.state(), SessionState::Established);
        a.session.send(PacketType::NormalTraffic, b"ok").unwrap();
        assert_eq!(decode_headers(&a.take_output()).len(), 1);
    }

    #[test]
    fn failed_rehandshake_leaves_session_reset() {
        #[derive(Default)]
        struct Unpluggable {
            unplugged: bool,
        }
        impl io::Write for Unpluggable {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if self.unplugged {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
                }
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut session = Session::new(
            1,
            Framer::new(Unpluggable::default()),
            Recorder::default(),
        );
        let mut buffer = Buffer::new(64);
        let mut unframer = Unframer::new();
        session.start_session().unwrap();
        let reply = raw_packet(SessionHeader::new(0x5521, PacketType::StartSession), &[]);
        unframer
            .write(&reply, &mut session.receiver(&mut buffer))
            .unwrap();
        assert!(session.is_established());
        assert_eq!(session.session_id(), 0x5521);

        session.framer_mut().get_mut().unplugged = true;
        assert!(session.start_session().is_err());

        assert_eq!(session.state(), SessionState::Reset);
        assert!(!session.is_established());
        assert!(matches!(
            session.send(PacketType::NormalTraffic, b"late"),
            Err(SessionError::NotEstablished)
        ));
    }

    #[test]
    fn closure_handler() {
        let mut seen = Vec::new();
        {
            let mut session = Session::new(
                1,
                Framer::new(Vec::new()),
                |header: SessionHeader, payload: &mut Buffer| {
                    seen.push((header.packet_type, payload.as_slice().to_vec()));
                },
            );
            let mut buffer = Buffer::new(64);
            let mut unframer = Unframer::new();
            let wire = raw_packet(SessionHeader::new(0, PacketType::LogMessage), b"hi");
            unframer
                .write(&wire, &mut session.receiver(&mut buffer))
                .unwrap();
        }
        assert_eq!(seen, vec![(PacketType::LogMessage, b"hi".to_vec())]);
    }
}
