//! Hex-dump tracing of raw channel traffic.

use std::io::{Read, Write};

use tracing::level_filters::LevelFilter;
use tracing::Level;

const BYTES_PER_LINE: usize = 16;

/// Wraps a byte channel and logs every read and write as a hex dump.
///
/// Useful when bringing up a new target: framing bugs are far easier to spot
/// in the raw byte stream than in decoded packets.
#[derive(Debug)]
pub struct LoggingStream<T> {
    name: String,
    inner: T,
    level: Level,
}

impl<T> LoggingStream<T> {
    /// Wrap `inner`, logging at `DEBUG`.
    pub fn new(name: impl Into<String>, inner: T) -> Self {
        Self::with_level(name, inner, Level::DEBUG)
    }

    /// Wrap `inner`, logging at an explicit level.
    pub fn with_level(name: impl Into<String>, inner: T, level: Level) -> Self {
        Self {
            name: name.into(),
            inner,
            level,
        }
    }

    /// Borrow the wrapped channel.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the wrapped channel.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap and return the inner channel.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn log(&self, direction: &str, requested: usize, data: &[u8]) {
        if self.level > LevelFilter::current() {
            return;
        }
        let lines = hex_dump(data);
        let dump = if lines.len() > 1 {
            format!("\n{}", lines.join("\n"))
        } else {
            lines.into_iter().next().unwrap_or_default()
        };

        // `tracing` macros need a constant level, so dispatch by hand.
        match self.level {
            Level::ERROR => {
                tracing::error!(channel = %self.name, direction, requested, len = data.len(), "{dump}")
            }
            Level::WARN => {
                tracing::warn!(channel = %self.name, direction, requested, len = data.len(), "{dump}")
            }
            Level::INFO => {
                tracing::info!(channel = %self.name, direction, requested, len = data.len(), "{dump}")
            }
            Level::DEBUG => {
                tracing::debug!(channel = %self.name, direction, requested, len = data.len(), "{dump}")
            }
            _ => {
                tracing::trace!(channel = %self.name, direction, requested, len = data.len(), "{dump}")
            }
        }
    }
}

impl<T: Read> Read for LoggingStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.log("read", buf.len(), &buf[..n]);
        Ok(n)
    }
}

impl<T: Write> Write for LoggingStream<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.log("write", buf.len(), &buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Format bytes as `offset  hex  ascii` lines, 16 bytes per line.
///
/// Non-printable and whitespace bytes render as `.` in the ASCII column. A
/// single-line dump omits the offset column.
pub fn hex_dump(data: &[u8]) -> Vec<String> {
    if data.is_empty() {
        return vec![String::new()];
    }

    let mut lines: Vec<String> = data
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:04x}  {hex:47}  {ascii}", i * BYTES_PER_LINE)
        })
        .collect();

    if lines.len() == 1 {
        lines[0] = lines[0].split_off(6);
    }
    lines
}
