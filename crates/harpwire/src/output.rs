use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use harpwire_frame::{Frame, ProtocolError, DEVICE_PORT};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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
struct FrameOutput {
    kind: &'static str,
    message_type: String,
    error: bool,
    address: Option<u8>,
    port: Option<u8>,
    payload_type: String,
    timestamp: Option<f64>,
    values: Vec<String>,
    size: usize,
}

impl FrameOutput {
    fn from_frame(frame: &Frame) -> Self {
        Self {
            kind: "frame",
            message_type: message_type_name(frame),
            error: frame.is_error(),
            address: frame.address(),
            port: frame.port(),
            payload_type: payload_type_name(frame),
            timestamp: frame.timestamp().map(|ts| ts.as_secs_f64()),
            values: payload_values(frame),
            size: frame.wire_size(),
        }
    }
}

#[derive(Serialize)]
struct DiagnosticOutput<'a> {
    kind: &'static str,
    address: Option<u8>,
    message: &'a str,
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FrameOutput::from_frame(frame)),
        OutputFormat::Table => {
            let out = FrameOutput::from_frame(frame);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "ADDRESS", "PORT", "PAYLOAD", "TIMESTAMP", "VALUES"])
                .add_row(vec![
                    out.message_type,
                    opt_to_string(out.address),
                    port_label(out.port),
                    out.payload_type,
                    out.timestamp.map_or_else(|| "-".to_string(), |ts| format!("{ts:.6}")),
                    out.values.join(", "),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let out = FrameOutput::from_frame(frame);
            let timestamp = out
                .timestamp
                .map(|ts| format!(" ts={ts:.6}"))
                .unwrap_or_default();
            println!(
                "{}{} address={} port={} type={}{} values=[{}]",
                out.message_type,
                if out.error { " (error)" } else { "" },
                opt_to_string(out.address),
                port_label(out.port),
                out.payload_type,
                timestamp,
                out.values.join(", ")
            );
        }
        OutputFormat::Raw => print_raw(frame.as_bytes()),
    }
}

pub fn print_diagnostic(error: &ProtocolError, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DiagnosticOutput {
            kind: "diagnostic",
            address: error.frame().address(),
            message: error.message(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("diagnostic: {}", error.message()),
        // Raw output stays a valid capture; the error frame is written as received.
        OutputFormat::Raw => print_raw(error.frame().as_bytes()),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
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

pub fn message_type_name(frame: &Frame) -> String {
    frame
        .message_type()
        .map_or_else(|| format!("0x{:02x}", frame.id()), |kind| kind.name().to_string())
}

pub fn payload_type_name(frame: &Frame) -> String {
    match (frame.payload_type(), frame.raw_payload_type()) {
        (Some(kind), _) => kind.name().to_string(),
        (None, Some(raw)) => format!("0x{raw:02x}"),
        (None, None) => "-".to_string(),
    }
}

/// Every complete element of the payload, decoded as its declared type.
pub fn payload_values(frame: &Frame) -> Vec<String> {
    let Some(kind) = frame.payload_type() else {
        return Vec::new();
    };
    frame
        .payload()
        .chunks_exact(kind.size())
        .filter_map(|element| kind.first_scalar(element))
        .map(|value| value.to_string())
        .collect()
}

fn port_label(port: Option<u8>) -> String {
    match port {
        Some(DEVICE_PORT) => "device".to_string(),
        other => opt_to_string(other),
    }
}

fn opt_to_string(value: Option<u8>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
