use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use microlink_session::{Packet, PacketType, SessionHeader, HEADER_SIZE};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput {
    packet_type: PacketType,
    session_id: String,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                packet_type: packet.packet_type,
                session_id: session_id_hex(packet.session_id),
                payload_size: packet.payload.len(),
                payload: payload_preview(packet.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SESSION", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    packet.packet_type.name().to_string(),
                    session_id_hex(packet.session_id),
                    packet.payload.len().to_string(),
                    payload_preview(packet.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} session={} size={} payload={}",
                packet.packet_type,
                session_id_hex(packet.session_id),
                packet.payload.len(),
                payload_preview(packet.payload.as_ref())
            );
        }
        OutputFormat::Raw => print_raw(packet.payload.as_ref()),
    }
}

/// One unframed packet from a captured stream.
#[derive(Serialize)]
pub struct DecodedPacket {
    pub index: usize,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_type: Option<PacketType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub payload: String,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl DecodedPacket {
    /// Describe `payload`, reading a session header off the front when one
    /// parses.
    pub fn new(index: usize, payload: &[u8]) -> Self {
        let header = SessionHeader::parse(payload);
        let body = match header {
            Some(_) => &payload[HEADER_SIZE..],
            None => payload,
        };
        Self {
            index,
            size: payload.len(),
            packet_type: header.map(|h| h.packet_type),
            session_id: header.map(|h| session_id_hex(h.session_id)),
            payload: payload_preview(body),
            raw: payload.to_vec(),
        }
    }
}

#[derive(Serialize)]
pub struct DecodeReport {
    pub packets: Vec<DecodedPacket>,
    pub checksum_failures: usize,
    pub aborted: usize,
}

pub fn print_decode_report(report: &DecodeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "TYPE", "SESSION", "PAYLOAD"]);
            for packet in &report.packets {
                table.add_row(vec![
                    packet.index.to_string(),
                    packet.size.to_string(),
                    packet.packet_type.map_or("-", |t| t.name()).to_string(),
                    packet.session_id.clone().unwrap_or_else(|| "-".to_string()),
                    packet.payload.clone(),
                ]);
            }
            println!("{table}");
            println!(
                "{} packets, {} checksum failures, {} aborted",
                report.packets.len(),
                report.checksum_failures,
                report.aborted
            );
        }
        OutputFormat::Pretty => {
            for packet in &report.packets {
                println!(
                    "#{} size={} type={} session={} payload={}",
                    packet.index,
                    packet.size,
                    packet.packet_type.map_or("-", |t| t.name()),
                    packet.session_id.as_deref().unwrap_or("-"),
                    packet.payload
                );
            }
            println!(
                "packets={} checksum_failures={} aborted={}",
                report.packets.len(),
                report.checksum_failures,
                report.aborted
            );
        }
        OutputFormat::Raw => {
            for packet in &report.packets {
                print_raw(&packet.raw);
            }
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn session_id_hex(session_id: u16) -> String {
    format!("{session_id:#06x}")
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
