//! Session layer for microlink.
//!
//! A session tags every packet with a 3-byte header (session id and packet
//! type) and negotiates the session id through a nonce handshake, so traffic
//! from a stale connection or a rebooted peer is never delivered as current.
//! [`Link`] glues a session to a byte channel for host and target programs.

pub mod config;
#[cfg(unix)]
pub mod connector;
pub mod error;
pub mod header;
pub mod link;
#[cfg(unix)]
pub mod listener;
pub mod session;

pub use config::{LinkConfig, DEFAULT_MAX_PACKET_SIZE};
#[cfg(unix)]
pub use connector::{connect, link_over, open_device, spawn, SerialLink};
pub use error::{Result, SessionError};
pub use header::{PacketType, SessionHeader, HEADER_SIZE};
pub use link::{random_nonce, InboundQueue, Link, Packet};
#[cfg(unix)]
pub use listener::LinkListener;
pub use session::{next_nonce, PacketHandler, Session, SessionReceiver, SessionState};
