//! CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no reflection.

/// Running value used when no prior checksum is supplied.
pub const CRC16_INITIAL: u16 = 0xFFFF;

/// Fold `data` into a running CRC.
///
/// Pass `None` to start a fresh checksum, or the value returned by a previous
/// call to continue it; splitting input across calls yields the same result
/// as one call over the concatenation.
pub fn crc16(data: &[u8], prior: Option<u16>) -> u16 {
    let mut crc = prior.unwrap_or(CRC16_INITIAL);
    for &byte in data {
        crc = crc.rotate_left(8);
        crc ^= u16::from(byte);
        crc ^= (crc & 0x00FF) >> 4;
        crc ^= crc << 12;
        crc ^= (crc & 0x00FF) << 5;
    }
    crc
}
