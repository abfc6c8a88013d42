use std::collections::BTreeSet;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use harpwire_frame::{DecoderStats, Frame, FrameReader, MessageType};
use harpwire_transport::ByteStream;
use serde::Serialize;

use crate::cmd::InspectArgs;
use crate::exit::{frame_error, transport_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize, Default, Debug)]
struct InspectOutput {
    path: String,
    frames: u64,
    reads: u64,
    writes: u64,
    events: u64,
    error_frames: u64,
    timestamped: u64,
    addresses: Vec<u8>,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
    noise_bytes: u64,
    zero_lengths: u64,
    checksum_failures: u64,
}

impl InspectOutput {
    fn record(&mut self, frame: &Frame, addresses: &mut BTreeSet<u8>) {
        self.frames += 1;
        match frame.message_type() {
            Some(MessageType::Read) => self.reads += 1,
            Some(MessageType::Write) => self.writes += 1,
            Some(MessageType::Event) => self.events += 1,
            None => {}
        }
        if frame.is_error() {
            self.error_frames += 1;
        }
        if let Some(address) = frame.address() {
            addresses.insert(address);
        }
        if let Some(ts) = frame.timestamp() {
            self.timestamped += 1;
            let secs = ts.as_secs_f64();
            self.first_timestamp.get_or_insert(secs);
            self.last_timestamp = Some(secs);
        }
    }

    fn apply_stats(&mut self, stats: DecoderStats) {
        self.noise_bytes = stats.noise_bytes;
        self.zero_lengths = stats.zero_lengths;
        self.checksum_failures = stats.checksum_failures;
    }

    fn span(&self) -> Option<f64> {
        Some(self.last_timestamp? - self.first_timestamp?)
    }
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let stream = ByteStream::open_capture(&args.file)
        .map_err(|err| transport_error("open failed", &err))?;
    let mut reader = FrameReader::new(stream);

    let mut out = InspectOutput {
        path: args.file.display().to_string(),
        ..InspectOutput::default()
    };
    let mut addresses = BTreeSet::new();
    for frame in reader.frames() {
        let frame = frame.map_err(|err| frame_error("read failed", &err))?;
        out.record(&frame, &mut addresses);
    }
    out.addresses = addresses.into_iter().collect();
    out.apply_stats(reader.stats());

    print_summary(&out, format);
    if out.frames == 0 && out.noise_bytes + out.zero_lengths + out.checksum_failures > 0 {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

fn print_summary(out: &InspectOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in summary_rows(out) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Capture {}:", out.path);
            for (field, value) in summary_rows(out) {
                println!("  {:<18}{}", format!("{field}:"), value);
            }
        }
        OutputFormat::Raw => println!("{}", out.frames),
    }
}

fn summary_rows(out: &InspectOutput) -> Vec<(&'static str, String)> {
    let addresses = out
        .addresses
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        ("Frames", out.frames.to_string()),
        ("Read", out.reads.to_string()),
        ("Write", out.writes.to_string()),
        ("Event", out.events.to_string()),
        ("Error frames", out.error_frames.to_string()),
        ("Timestamped", out.timestamped.to_string()),
        ("Addresses", addresses),
        (
            "Span",
            out.span()
                .map_or_else(|| "-".to_string(), |secs| format!("{secs:.6}s")),
        ),
        ("Noise bytes", out.noise_bytes.to_string()),
        ("Zero lengths", out.zero_lengths.to_string()),
        ("Checksum failures", out.checksum_failures.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use harpwire_frame::{Header, PayloadType, Timestamp};

    use super::*;

    #[test]
    fn summary_counts_categories_and_span() {
        let mut out = InspectOutput::default();
        let mut addresses = BTreeSet::new();
        let frames = [
            Header::new(MessageType::Read, 32, PayloadType::U8)
                .with_timestamp(Timestamp::new(10, 0)),
            Header::new(MessageType::Write, 33, PayloadType::U8).with_error(),
            Header::new(MessageType::Event, 32, PayloadType::U8)
                .with_timestamp(Timestamp::new(12, 15625)),
        ];
        for header in &frames {
            out.record(&Frame::new(header, &[0]).unwrap(), &mut addresses);
        }

        assert_eq!((out.reads, out.writes, out.events), (1, 1, 1));
        assert_eq!(out.error_frames, 1);
        assert_eq!(out.timestamped, 2);
        assert_eq!(addresses.into_iter().collect::<Vec<_>>(), vec![32, 33]);
        assert!((out.span().unwrap() - 2.5).abs() < 1e-9);
    }
}
