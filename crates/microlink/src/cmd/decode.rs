use microlink_frame::decode_packets;

use crate::cmd::{read_input, DecodeArgs};
use crate::exit::{CliResult, CHECKSUM_FAILURES, SUCCESS};
use crate::output::{print_decode_report, DecodeReport, DecodedPacket, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = read_input(args.file.as_ref())?;
    let report = decode(&wire);
    tracing::debug!(
        wire_bytes = wire.len(),
        packets = report.packets.len(),
        checksum_failures = report.checksum_failures,
        "decoded capture"
    );
    print_decode_report(&report, format);

    if args.strict && report.checksum_failures > 0 {
        return Ok(CHECKSUM_FAILURES);
    }
    Ok(SUCCESS)
}

fn decode(wire: &[u8]) -> DecodeReport {
    let mut collector = decode_packets(wire);
    let checksum_failures = collector.invalid_count();
    let aborted = collector.aborted_count();
    let packets = collector
        .drain()
        .enumerate()
        .map(|(index, payload)| DecodedPacket::new(index, &payload))
        .collect();
    DecodeReport {
        packets,
        checksum_failures,
        aborted,
    }
}
