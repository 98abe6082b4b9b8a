//! One-shot helpers over [`Framer`] and [`Unframer`] for whole buffers.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::escape::{CRC_FIELD_SIZE, LENGTH_FIELD_SIZE, START_MARKER};
use crate::framer::Framer;
use crate::sink::PacketCollector;
use crate::unframer::Unframer;

/// Encode `payload` as a single packet, resync byte included.
///
/// This is what a freshly opened [`Framer`] puts on the wire.
pub fn encode_packet(payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(max_wire_size(payload.len()));
    encode_packet_into(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Append the encoding of `payload` to `dst`.
pub fn encode_packet_into(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let mut framer = Framer::new(dst.writer());
    framer.write_packet(payload)
}

/// Upper bound on the wire size of a packet with `payload_len` payload bytes
/// (every escapable byte doubled, resync byte included).
pub fn max_wire_size(payload_len: usize) -> usize {
    1 + START_MARKER.len() + 2 * (LENGTH_FIELD_SIZE + payload_len + CRC_FIELD_SIZE)
}

/// Decode every packet in a captured byte stream.
///
/// Invalid packets are counted in the returned collector, not returned.
pub fn decode_packets(wire: &[u8]) -> PacketCollector {
    let mut unframer = Unframer::new();
    let mut sink = PacketCollector::new();
    // `PacketCollector` without a size limit never rejects bytes.
    let _ = unframer.write(wire, &mut sink);
    sink
}
