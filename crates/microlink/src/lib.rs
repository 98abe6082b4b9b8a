//! Reliable packet links to microcontrollers over noisy serial lines.
//!
//! microlink frames packets with escape codes and a CRC so a receiver can
//! resynchronize mid-stream, and runs a small session handshake on top so
//! stale traffic from a previous connection is never delivered.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte channels (Unix sockets, emulator subprocesses, device nodes)
//! - [`frame`]: checksum, byte buffer, `Framer` and `Unframer`
//! - [`session`]: session header, handshake state machine, `Link` glue

/// Re-export transport types.
pub mod transport {
    pub use microlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use microlink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use microlink_session::*;
}
