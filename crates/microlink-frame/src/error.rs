/// Errors that can occur while framing or unframing packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while writing framed bytes.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying channel accepted zero bytes.
    #[error("connection closed")]
    ConnectionClosed,

    /// An operation was called out of sequence.
    #[error("{operation} not valid in framer state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A payload chunk is larger than what the current packet has left.
    #[error("payload chunk of {size} bytes exceeds {remaining} bytes remaining in packet")]
    ChunkTooLarge { size: usize, remaining: usize },

    /// `finish_packet` was called before the whole payload was written.
    #[error("packet still has {remaining} payload bytes outstanding")]
    PayloadIncomplete { remaining: usize },

    /// The payload length does not fit the 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A fixed-capacity buffer could not hold the incoming bytes.
    #[error("buffer full ({size} bytes offered, {available} available)")]
    BufferFull { size: usize, available: usize },

    /// The downstream packet sink refused payload bytes.
    #[error("packet sink rejected payload after {consumed} input bytes: {source}")]
    Sink {
        consumed: usize,
        #[source]
        source: Box<FrameError>,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
