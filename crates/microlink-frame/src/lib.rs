//! Escape-based packet framing for unreliable byte streams.
//!
//! Every packet on the wire is:
//! - the unescaped start marker `0xFF 0xFD`
//! - a 4-byte little-endian payload length, escaped
//! - the payload, escaped
//! - a 2-byte little-endian CRC-16 over everything before it, escaped
//!
//! Escaping doubles every `0xFF`. `0xFF 0xFE` is a keep-alive that decodes to
//! nothing. A start marker seen mid-packet abandons that packet, which lets a
//! receiver that joins mid-stream or loses bytes find the next boundary
//! without closing the channel.

pub mod buffer;
pub mod codec;
pub mod crc;
pub mod error;
pub mod escape;
pub mod framer;
pub mod sink;
pub mod unframer;

pub use buffer::Buffer;
pub use codec::{decode_packets, encode_packet, encode_packet_into, max_wire_size};
pub use crc::{crc16, CRC16_INITIAL};
pub use error::{FrameError, Result};
pub use escape::{ESCAPE_NOP, ESCAPE_START, PACKET_START};
pub use framer::{Framer, FramerState};
pub use sink::{PacketCollector, PacketSink};
pub use unframer::{Unframer, UnframerState};
