use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tdswire_packet::{Message, Packet};

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
struct PacketOutput<'a> {
    schema_id: &'a str,
    msg_type: &'a str,
    status: String,
    length: u16,
    channel: u16,
    packet_nr: u8,
    window: u8,
    payload_size: usize,
    payload: String,
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let header = &packet.header;
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                schema_id: "https://schemas.tdswire.dev/cli/v1/packet.schema.json",
                msg_type: header.msg_type.name(),
                status: header.status.to_string(),
                length: header.length,
                channel: header.channel,
                packet_nr: header.packet_nr,
                window: header.window,
                payload_size: packet.payload.len(),
                payload: payload_preview(packet.payload.as_ref()),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "STATUS", "LENGTH", "CHANNEL", "NR", "WINDOW", "PAYLOAD"])
                .add_row(vec![
                    header.msg_type.name().to_string(),
                    header.status.to_string(),
                    header.length.to_string(),
                    header.channel.to_string(),
                    header.packet_nr.to_string(),
                    header.window.to_string(),
                    payload_preview(packet.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} payload={}",
                header,
                payload_preview(packet.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(packet.payload.as_ref());
        }
    }
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    schema_id: &'a str,
    addr: &'a str,
    msg_type: &'a str,
    payload_size: usize,
    elapsed_ms: u128,
}

pub fn print_probe(addr: &str, message: &Message, elapsed: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ProbeOutput {
                schema_id: "https://schemas.tdswire.dev/cli/v1/probe.schema.json",
                addr,
                msg_type: message.msg_type.name(),
                payload_size: message.payload.len(),
                elapsed_ms: elapsed.as_millis(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDR", "TYPE", "SIZE", "ELAPSED"])
                .add_row(vec![
                    addr.to_string(),
                    message.msg_type.name().to_string(),
                    message.payload.len().to_string(),
                    format!("{}ms", elapsed.as_millis()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "addr={} type={} size={} elapsed={}ms",
                addr,
                message.msg_type.name(),
                message.payload.len(),
                elapsed.as_millis()
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

const PREVIEW_BYTES: usize = 32;

fn payload_preview(payload: &[u8]) -> String {
    if payload.is_empty() {
        return String::new();
    }
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c.is_whitespace()) => text.to_string(),
        _ => {
            let shown = &payload[..payload.len().min(PREVIEW_BYTES)];
            let hex: String = shown.iter().map(|b| format!("{b:02x}")).collect();
            if payload.len() > PREVIEW_BYTES {
                format!("0x{hex}.. ({} bytes)", payload.len())
            } else {
                format!("0x{hex}")
            }
        }
    }
}
