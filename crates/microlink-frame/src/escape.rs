//! Reserved byte values and field sizes of the wire format.
//!
//! Only [`ESCAPE_START`] is ever escaped (by doubling it). The other two codes
//! are meaningful only when they directly follow an `ESCAPE_START`.

/// Introduces an escape sequence.
pub const ESCAPE_START: u8 = 0xFF;

/// `ESCAPE_START, ESCAPE_NOP` is a keep-alive and decodes to nothing.
/// Sent alone, unescaped, it is the framer's resync courtesy byte.
pub const ESCAPE_NOP: u8 = 0xFE;

/// `ESCAPE_START, PACKET_START` begins a packet.
pub const PACKET_START: u8 = 0xFD;

/// The unescaped two-byte sequence that opens every packet.
pub const START_MARKER: [u8; 2] = [ESCAPE_START, PACKET_START];

/// Payload length field: `u32`, little-endian.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Checksum field: `u16`, little-endian.
pub const CRC_FIELD_SIZE: usize = 2;

/// Size of the bounded scratch buffers used while escaping and unescaping.
pub const CHUNK_SIZE: usize = 128;

/// Escape as much of `input` as fits in `out`.
///
/// Returns `(consumed, produced)`. An `ESCAPE_START` is never split across
/// calls: if only one output byte is left it stays in `input`.
pub fn escape_into(input: &[u8], out: &mut [u8]) -> (usize, usize) {
    let mut produced = 0;
    let mut consumed = 0;
    for &b in input {
        let needed = if b == ESCAPE_START { 2 } else { 1 };
        if produced + needed > out.len() {
            break;
        }
        out[produced] = b;
        if b == ESCAPE_START {
            out[produced + 1] = ESCAPE_START;
        }
        produced += needed;
        consumed += 1;
    }
    (consumed, produced)
}
