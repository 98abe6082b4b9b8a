use crate::error::{FrameError, Result};
use crate::sink::PacketSink;

/// Fixed-capacity append/consume byte store.
///
/// Storage is allocated once at construction and never grows. Writes append
/// at the tail, reads consume from the head, and [`Buffer::clear`] rewinds
/// both. Nothing is compacted: space freed by reads is only reclaimed by
/// `clear`, so a packet's bytes stay contiguous until the packet is handled.
#[derive(Clone)]
pub struct Buffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl Buffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Append as many bytes as fit, returning how many were stored.
    ///
    /// Excess bytes are silently dropped; use [`PacketSink::write_all`] when
    /// truncation must be an error.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        self.data[self.tail..self.tail + n].copy_from_slice(&bytes[..n]);
        self.tail += n;
        n
    }

    /// Consume up to `out.len()` bytes from the front, returning how many were copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.size());
        out[..n].copy_from_slice(&self.data[self.head..self.head + n]);
        self.head += n;
        n
    }

    /// Number of bytes available to read.
    pub fn size(&self) -> usize {
        self.tail - self.head
    }

    /// True when there is nothing left to read.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total bytes this buffer can hold between clears.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Space left for writes before the next clear.
    pub fn free(&self) -> usize {
        self.data.len() - self.tail
    }

    /// Unread bytes, without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

impl PacketSink for Buffer {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.free() {
            return Err(FrameError::BufferFull {
                size: data.len(),
                available: self.free(),
            });
        }
        self.write(data);
        Ok(())
    }

    fn packet_aborted(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut buf = Buffer::new(8);
        assert_eq!(buf.write(b"abc"), 3);
        assert_eq!(buf.size(), 3);

        let mut out = [0u8; 2];
        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(&out, b"ab");
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.as_slice(), b"c");
    }

    #[test]
    fn write_truncates_at_capacity() {
        let mut buf = Buffer::new(4);
        assert_eq!(buf.write(b"abcdef"), 4);
        assert_eq!(buf.write(b"g"), 0);
        assert_eq!(buf.as_slice(), b"abcd");
    }

    #[test]
    fn reads_do_not_free_space() {
        let mut buf = Buffer::new(4);
        buf.write(b"abcd");
        let mut out = [0u8; 4];
        buf.read(&mut out);
        assert!(buf.is_empty());
        assert_eq!(buf.free(), 0);

        buf.clear();
        assert_eq!(buf.free(), 4);
        assert_eq!(buf.write(b"wxyz"), 4);
    }

    #[test]
    fn read_from_empty_returns_zero() {
        let mut buf = Buffer::new(4);
        let mut out = [0u8; 4];
        assert_eq!(buf.read(&mut out), 0);
    }

    #[test]
    fn sink_write_all_rejects_overflow() {
        let mut buf = Buffer::new(4);
        PacketSink::write_all(&mut buf, b"abc").unwrap();
        let err = PacketSink::write_all(&mut buf, b"de").unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferFull {
                size: 2,
                available: 1
            }
        ));
        assert_eq!(buf.as_slice(), b"abc");
    }

    #[test]
    fn zero_capacity_buffer() {
        let mut buf = Buffer::new(0);
        assert_eq!(buf.write(b"x"), 0);
        assert!(buf.is_empty());
    }
}
