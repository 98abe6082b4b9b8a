use microlink_frame::encode_packet;
use microlink_session::{PacketType, SessionHeader};
use serde::Serialize;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_json, print_raw, to_hex, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    payload_size: usize,
    wire_size: usize,
    wire: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let body = args.payload.resolve()?;
    let payload = with_header(
        args.session_id,
        PacketType::from(args.packet_type),
        &body,
    );
    let wire = encode_packet(&payload).map_err(|err| frame_error("encode failed", err))?;

    match format {
        OutputFormat::Raw => print_raw(&wire),
        OutputFormat::Json => print_json(&EncodeOutput {
            payload_size: payload.len(),
            wire_size: wire.len(),
            wire: to_hex(&wire),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", to_hex(&wire)),
    }
    Ok(SUCCESS)
}

fn with_header(session_id: Option<u16>, packet_type: PacketType, body: &[u8]) -> Vec<u8> {
    let Some(session_id) = session_id else {
        return body.to_vec();
    };
    let header = SessionHeader::new(session_id, packet_type).encode();
    let mut payload = Vec::with_capacity(header.len() + body.len());
    payload.extend_from_slice(&header);
    payload.extend_from_slice(body);
    payload
}
