use std::ffi::OsStr;
use std::path::Path;

use microlink_transport::{
    LoggingStream, SerialReader, SerialStream, SerialWriter, UnixSocketListener,
};
use tracing::Level;

use crate::config::LinkConfig;
use crate::error::Result;
use crate::link::Link;

/// A [`Link`] over one of the transport channels. Raw traffic is hex-dumped
/// at `TRACE`.
pub type SerialLink = Link<LoggingStream<SerialReader>, LoggingStream<SerialWriter>>;

/// Connect to an emulated target on a Unix socket and establish a session.
pub fn connect(path: impl AsRef<Path>, config: LinkConfig) -> Result<SerialLink> {
    let stream = UnixSocketListener::connect(path)?;
    establish_over(stream, config)
}

/// Launch a target emulator and establish a session over its stdin/stdout.
pub fn spawn<I, S>(program: &str, args: I, config: LinkConfig) -> Result<SerialLink>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stream = SerialStream::spawn(program, args)?;
    establish_over(stream, config)
}

/// Open a serial device node and establish a session with the board.
pub fn open_device(path: impl AsRef<Path>, config: LinkConfig) -> Result<SerialLink> {
    let stream = SerialStream::open_device(path)?;
    establish_over(stream, config)
}

/// Wrap a connected channel in a [`Link`] without starting a handshake.
pub fn link_over(stream: SerialStream, config: LinkConfig) -> Result<SerialLink> {
    stream.set_read_timeout(config.read_timeout)?;
    let name = stream.transport_name();
    let (reader, writer) = stream.split()?;
    Ok(Link::new(
        LoggingStream::with_level(name, reader, Level::TRACE),
        LoggingStream::with_level(name, writer, Level::TRACE),
        config,
    ))
}

fn establish_over(stream: SerialStream, config: LinkConfig) -> Result<SerialLink> {
    let timeout = config.handshake_timeout;
    let mut link = link_over(stream, config)?;
    link.establish(timeout)?;
    Ok(link)
}
