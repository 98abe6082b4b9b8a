use microlink_session::{
    connect, open_device, spawn, Link, LinkConfig, Packet, PacketType, SerialLink, SessionError,
};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let packet_type = PacketType::from(args.packet_type);
    if packet_type == PacketType::StartSession {
        return Err(CliError::new(
            USAGE,
            "start-session packets are sent by the handshake, not by hand",
        ));
    }

    let config = LinkConfig {
        handshake_timeout: parse_duration(&args.handshake_timeout)?,
        recv_timeout: Some(parse_duration(&args.wait_timeout)?),
        ..LinkConfig::default()
    };
    let payload = args.payload.resolve()?;

    let mut link = open_link(&args, config)?;
    tracing::debug!(
        session_id = format_args!("{:#06x}", link.session_id()),
        "session established"
    );

    link.send(packet_type, &payload)
        .map_err(|err| session_error("send failed", err))?;

    if args.wait {
        let reply = wait_for_reply(&mut link, packet_type)
            .map_err(|err| session_error("receive failed", err))?;
        print_packet(&reply, format);
    }

    Ok(SUCCESS)
}

fn open_link(args: &SendArgs, config: LinkConfig) -> CliResult<SerialLink> {
    let link = if let Some(program) = &args.spawn {
        spawn(program, &args.spawn_args, config)
    } else if let Some(device) = &args.device {
        open_device(device, config)
    } else if let Some(path) = &args.path {
        connect(path, config)
    } else {
        return Err(CliError::new(USAGE, "no target given"));
    };
    link.map_err(|err| session_error("connect failed", err))
}

trait ReplySource {
    fn next_packet(&mut self) -> Result<Packet, SessionError>;
}

impl<R: std::io::Read, W: std::io::Write> ReplySource for Link<R, W> {
    fn next_packet(&mut self) -> Result<Packet, SessionError> {
        self.recv()
    }
}

/// Wait for a reply of the type that was sent. Log messages that arrive in
/// the meantime are passed to the log, not mistaken for the reply.
fn wait_for_reply<S: ReplySource>(
    source: &mut S,
    packet_type: PacketType,
) -> Result<Packet, SessionError> {
    loop {
        let packet = source.next_packet()?;
        if packet.packet_type == packet_type {
            return Ok(packet);
        }
        tracing::info!(
            packet_type = %packet.packet_type,
            payload = %String::from_utf8_lossy(&packet.payload),
            "target message while waiting for reply"
        );
    }
}
