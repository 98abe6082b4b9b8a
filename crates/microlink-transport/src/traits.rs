use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// A connected byte channel to a target. Implements `Read` and `Write`.
///
/// The channel is an in-order byte stream with no message boundaries. It may
/// be a Unix domain socket to an emulator, the stdin/stdout pipes of a spawned
/// emulator process, or a serial device node.
pub struct SerialStream {
    inner: StreamInner,
}

enum StreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Device(File),
    Process(ChildPipes),
}

struct ChildPipes {
    child: ChildGuard,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

/// Kills and reaps the emulator process when the write half goes away.
struct ChildGuard {
    child: Child,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!(pid = self.child.id(), "terminating target process");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Read half of a split [`SerialStream`].
pub struct SerialReader {
    inner: ReaderInner,
}

enum ReaderInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Device(File),
    Pipe(ChildStdout),
}

/// Write half of a split [`SerialStream`].
pub struct SerialWriter {
    inner: WriterInner,
}

enum WriterInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Device(File),
    Pipe {
        stdin: ChildStdin,
        // Held for its Drop: the process lives as long as we can write to it.
        _child: ChildGuard,
    },
}

impl SerialStream {
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }

    /// Open a serial device node (e.g. `/dev/ttyACM0`) for reading and writing.
    ///
    /// Line settings (baud rate, parity) are left as the OS configured them.
    pub fn open_device(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| TransportError::Device {
                path: path.to_path_buf(),
                source,
            })?;
        info!(?path, "opened serial device");
        Ok(Self {
            inner: StreamInner::Device(file),
        })
    }

    /// Launch a target emulator and talk to it over its stdin/stdout.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Shutdown);
            }
        };
        info!(program, pid = child.id(), "spawned target process");

        Ok(Self {
            inner: StreamInner::Process(ChildPipes {
                child: ChildGuard { child },
                stdin,
                stdout,
            }),
        })
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> Result<(SerialReader, SerialWriter)> {
        match self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => {
                let reader = stream.try_clone()?;
                Ok((
                    SerialReader {
                        inner: ReaderInner::Unix(reader),
                    },
                    SerialWriter {
                        inner: WriterInner::Unix(stream),
                    },
                ))
            }
            StreamInner::Device(file) => {
                let reader = file.try_clone()?;
                Ok((
                    SerialReader {
                        inner: ReaderInner::Device(reader),
                    },
                    SerialWriter {
                        inner: WriterInner::Device(file),
                    },
                ))
            }
            StreamInner::Process(pipes) => Ok((
                SerialReader {
                    inner: ReaderInner::Pipe(pipes.stdout),
                },
                SerialWriter {
                    inner: WriterInner::Pipe {
                        stdin: pipes.stdin,
                        _child: pipes.child,
                    },
                },
            )),
        }
    }

    /// Set read timeout on the underlying channel.
    ///
    /// Only sockets support timeouts; other channels block and this is a no-op.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            _ => {
                if timeout.is_some() {
                    debug!(
                        transport = self.transport_name(),
                        "read timeout not supported; reads will block"
                    );
                }
                Ok(())
            }
        }
    }

    /// Set write timeout on the underlying channel (sockets only).
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            _ => Ok(()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
            StreamInner::Device(_) => "serial-device",
            StreamInner::Process(_) => "subprocess",
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for SerialStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
            StreamInner::Device(file) => file.read(buf),
            StreamInner::Process(pipes) => pipes.stdout.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
            StreamInner::Device(file) => file.write(buf),
            StreamInner::Process(pipes) => pipes.stdin.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
            StreamInner::Device(file) => file.flush(),
            StreamInner::Process(pipes) => pipes.stdin.flush(),
        }
    }
}

impl Read for SerialReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ReaderInner::Unix(stream) => stream.read(buf),
            ReaderInner::Device(file) => file.read(buf),
            ReaderInner::Pipe(stdout) => stdout.read(buf),
        }
    }
}

impl Write for SerialWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            WriterInner::Unix(stream) => stream.write(buf),
            WriterInner::Device(file) => file.write(buf),
            WriterInner::Pipe { stdin, .. } => stdin.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            WriterInner::Unix(stream) => stream.flush(),
            WriterInner::Device(file) => file.flush(),
            WriterInner::Pipe { stdin, .. } => stdin.flush(),
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

impl std::fmt::Debug for SerialReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialReader").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for SerialWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWriter").finish_non_exhaustive()
    }
}
