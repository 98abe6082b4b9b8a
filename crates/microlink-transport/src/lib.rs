//! Byte channels to remote execution targets.
//!
//! Provides a unified in-order byte stream over the ways a host reaches a
//! target:
//! - Unix domain sockets (emulated targets listening locally)
//! - A spawned emulator process talking over stdin/stdout
//! - A serial device node already configured by the OS
//!
//! This is the lowest layer of microlink. Framing and sessions build on top
//! of the [`SerialStream`] type provided here.

pub mod error;
pub mod logger;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use logger::{hex_dump, LoggingStream};
pub use traits::{SerialReader, SerialStream, SerialWriter};

#[cfg(unix)]
pub use uds::UnixSocketListener;
