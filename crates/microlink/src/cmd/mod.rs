use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use microlink_session::PacketType;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod emulate;
pub mod encode;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Frame one payload and print the wire bytes.
    Encode(EncodeArgs),
    /// Unframe a captured byte stream and list its packets.
    Decode(DecodeArgs),
    /// Act as a target on a Unix socket: answer handshakes and echo traffic.
    Emulate(EmulateArgs),
    /// Establish a session with a target and send one payload.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Emulate(args) => emulate::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where a payload comes from. At most one source may be given; none means
/// an empty payload.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Payload as hex digits (whitespace ignored), e.g. "aa ff 01".
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(hex) = &self.hex {
            return parse_hex(hex);
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

/// Packet types as spelled on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PacketKind {
    StartSession,
    NormalTraffic,
    LogMessage,
}

impl From<PacketKind> for PacketType {
    fn from(kind: PacketKind) -> Self {
        match kind {
            PacketKind::StartSession => PacketType::StartSession,
            PacketKind::NormalTraffic => PacketType::NormalTraffic,
            PacketKind::LogMessage => PacketType::LogMessage,
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Prepend a session header with this id (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_u16)]
    pub session_id: Option<u16>,
    /// Packet type for the session header.
    #[arg(long, value_enum, default_value = "normal-traffic", requires = "session_id")]
    pub packet_type: PacketKind,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured stream to read. Default: stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Exit non-zero when any packet fails its checksum.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// How long a connected host has to complete the handshake (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub handshake_timeout: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["path", "spawn", "device"])))]
pub struct SendArgs {
    /// Socket path of an emulated target.
    pub path: Option<PathBuf>,
    /// Launch a target emulator and talk over its stdin/stdout.
    #[arg(long, value_name = "PROGRAM")]
    pub spawn: Option<String>,
    /// Argument for the spawned emulator (repeatable).
    #[arg(long = "arg", value_name = "ARG", requires = "spawn", allow_hyphen_values = true)]
    pub spawn_args: Vec<String>,
    /// Serial device node, already configured for the board.
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<PathBuf>,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Packet type to send.
    #[arg(long, value_enum, default_value = "normal-traffic")]
    pub packet_type: PacketKind,
    /// Maximum time to wait for the handshake (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub handshake_timeout: String,
    /// Wait for one reply packet and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex payload has an odd number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex payload: {input}")))
        })
        .collect()
}

fn parse_u16(input: &str) -> Result<u16, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid session id {input}: {err}"))
}

pub fn read_input(path: Option<&PathBuf>) -> CliResult<Vec<u8>> {
    match path {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err)),
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .map_err(|err| io_error("failed reading stdin", err))?;
            Ok(data)
        }
    }
}
