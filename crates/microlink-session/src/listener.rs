use std::path::Path;

use microlink_transport::UnixSocketListener;
use tracing::debug;

use crate::config::LinkConfig;
use crate::connector::{link_over, SerialLink};
use crate::error::Result;

/// Target side of an emulated link: accepts host connections on a Unix
/// socket and answers their handshakes.
pub struct LinkListener {
    socket: UnixSocketListener,
}

impl LinkListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let socket = UnixSocketListener::bind(path)?;
        Ok(Self { socket })
    }

    /// Accept the next host and wait up to `config.handshake_timeout` for it
    /// to establish a session.
    pub fn accept(&self, config: LinkConfig) -> Result<SerialLink> {
        let stream = self.socket.accept()?;
        let timeout = config.handshake_timeout;
        let mut link = link_over(stream, config)?;
        link.wait_established(timeout)?;
        debug!(
            session_id = format_args!("{:#06x}", link.session_id()),
            "host session accepted"
        );
        Ok(link)
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

impl std::fmt::Debug for LinkListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkListener")
            .field("path", &self.path())
            .finish()
    }
}
