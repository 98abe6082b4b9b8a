use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Downstream consumer of unframed packet payloads.
///
/// The [`Unframer`](crate::Unframer) forwards payload bytes through
/// `write_all` as soon as they are unescaped, before the checksum has been
/// seen. Those bytes are provisional: they only become a packet when
/// `packet_done(true)` follows. `packet_done(false)` means the checksum did
/// not match and everything written since the previous packet boundary must
/// be discarded.
///
/// A packet abandoned mid-parse (a new start marker, a malformed escape, or a
/// rejected `write_all`) never gets a `packet_done`; the sink is told through
/// `packet_aborted` instead, so it can drop the partial payload before the
/// next packet's bytes arrive.
pub trait PacketSink {
    /// Accept provisional payload bytes. Returning an error aborts the packet.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// The packet in flight has ended; `is_valid` reports the checksum result.
    fn packet_done(&mut self, is_valid: bool) {
        let _ = is_valid;
    }

    /// The packet in flight was abandoned before its checksum was read.
    fn packet_aborted(&mut self) {}
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn packet_done(&mut self, is_valid: bool) {
        (**self).packet_done(is_valid)
    }

    fn packet_aborted(&mut self) {
        (**self).packet_aborted()
    }
}

/// Sink that keeps every validated payload as an owned [`Bytes`].
///
/// Handy for offline decoding of captured streams and for tests.
#[derive(Debug, Default)]
pub struct PacketCollector {
    pending: BytesMut,
    packets: VecDeque<Bytes>,
    invalid: usize,
    aborted: usize,
    max_packet_size: Option<usize>,
}

impl PacketCollector {
    /// Collector with no bound on payload size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector that rejects payloads larger than `max_packet_size`.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: Some(max_packet_size),
            ..Self::default()
        }
    }

    /// Pop the oldest validated payload.
    pub fn pop(&mut self) -> Option<Bytes> {
        self.packets.pop_front()
    }

    /// Number of validated payloads waiting.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// True when no validated payloads are waiting.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Count of packets that failed checksum validation.
    pub fn invalid_count(&self) -> usize {
        self.invalid
    }

    /// Count of packets abandoned before their checksum arrived.
    pub fn aborted_count(&self) -> usize {
        self.aborted
    }

    /// Drain every validated payload in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.packets.drain(..)
    }
}

impl PacketSink for PacketCollector {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if let Some(max) = self.max_packet_size {
            let available = max.saturating_sub(self.pending.len());
            if data.len() > available {
                self.pending.clear();
                return Err(FrameError::BufferFull {
                    size: data.len(),
                    available,
                });
            }
        }
        self.pending.extend_from_slice(data);
        Ok(())
    }

    fn packet_done(&mut self, is_valid: bool) {
        let payload = self.pending.split().freeze();
        if is_valid {
            self.packets.push_back(payload);
        } else {
            self.invalid += 1;
        }
    }

    fn packet_aborted(&mut self) {
        self.pending.clear();
        self.aborted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_packets_are_queued_in_order() {
        let mut sink = PacketCollector::new();
        sink.write_all(b"he").unwrap();
        sink.write_all(b"llo").unwrap();
        sink.packet_done(true);
        sink.write_all(b"world").unwrap();
        sink.packet_done(true);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.pop().unwrap().as_ref(), b"hello");
        assert_eq!(sink.pop().unwrap().as_ref(), b"world");
        assert!(sink.is_empty());
    }

    #[test]
    fn invalid_packets_are_counted_and_dropped() {
        let mut sink = PacketCollector::new();
        sink.write_all(b"bad").unwrap();
        sink.packet_done(false);
        sink.write_all(b"good").unwrap();
        sink.packet_done(true);

        assert_eq!(sink.invalid_count(), 1);
        assert_eq!(sink.drain().collect::<Vec<_>>(), vec![Bytes::from_static(b"good")]);
    }

    #[test]
    fn aborted_packet_leaves_no_residue() {
        let mut sink = PacketCollector::new();
        sink.write_all(b"partial").unwrap();
        sink.packet_aborted();
        sink.write_all(b"next").unwrap();
        sink.packet_done(true);

        assert_eq!(sink.aborted_count(), 1);
        assert_eq!(sink.pop().unwrap().as_ref(), b"next");
    }

    #[test]
    fn size_limit_rejects_and_resets() {
        let mut sink = PacketCollector::with_max_packet_size(4);
        sink.write_all(b"abc").unwrap();
        let err = sink.write_all(b"de").unwrap_err();
        assert!(matches!(err, FrameError::BufferFull { available: 1, .. }));

        sink.write_all(b"ok").unwrap();
        sink.packet_done(true);
        assert_eq!(sink.pop().unwrap().as_ref(), b"ok");
    }
}
