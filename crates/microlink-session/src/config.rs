use std::time::Duration;

/// Default receive buffer size: the largest packet payload, session header
/// included, that a link accepts.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 2048;

/// Configuration for a [`Link`](crate::Link).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Receive buffer capacity. Larger packets are dropped.
    pub max_packet_size: usize,
    /// Bytes requested from the channel per read.
    pub read_chunk_size: usize,
    /// How long `establish` and `wait_established` wait for the handshake.
    pub handshake_timeout: Duration,
    /// How long the initiator waits for a reply before sending `StartSession` again.
    pub handshake_retry_interval: Duration,
    /// How long `recv` waits for a packet. `None` waits forever.
    pub recv_timeout: Option<Duration>,
    /// Read timeout applied to socket channels so waits can observe deadlines.
    /// Pipes and device nodes always block.
    pub read_timeout: Option<Duration>,
    /// First nonce. `None` picks one at random.
    pub initial_nonce: Option<u8>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_chunk_size: 128,
            handshake_timeout: Duration::from_secs(5),
            handshake_retry_interval: Duration::from_millis(500),
            recv_timeout: None,
            read_timeout: Some(Duration::from_millis(50)),
            initial_nonce: None,
        }
    }
}
