/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] microlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] microlink_frame::FrameError),

    /// Application traffic was attempted before the handshake completed.
    #[error("session not established")]
    NotEstablished,

    /// No handshake or packet arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The peer closed the channel.
    #[error("peer disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
