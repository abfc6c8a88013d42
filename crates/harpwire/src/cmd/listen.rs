use std::fs::OpenOptions;

use harpwire_frame::FrameWriter;
use harpwire_session::{CancellationToken, SessionConfig, TransportSession};
use harpwire_transport::ByteStream;
use tracing::{debug, info};

use crate::cmd::printer::FramePrinter;
use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{io_error, transport_error, CliResult};
use crate::output::OutputFormat;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let stream = open(&args)?;

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let mut printer = FramePrinter::new(format, args.address, args.count, cancel.clone());
    if let Some(path) = &args.record {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| io_error(&format!("cannot record to {}", path.display()), &err))?;
        printer = printer.record_to(FrameWriter::new(file));
    }

    let config = SessionConfig {
        ignore_errors: args.ignore_errors,
        ..SessionConfig::default()
    };
    info!(path = ?stream.path(), kind = stream.kind().name(), "listening");
    let mut session = TransportSession::with_config(printer, config);
    // A quiet device blocks in read indefinitely; Ctrl-C must not wait on it.
    let state = session.run_detached(stream, &cancel);
    debug!(?state, stats = ?session.stats(), "listen finished");
    session.into_sink().finish()
}

fn open(args: &ListenArgs) -> CliResult<ByteStream> {
    if args.unix {
        return connect_bridge(args);
    }
    ByteStream::open_device(&args.path).map_err(|err| transport_error("open failed", &err))
}

#[cfg(unix)]
fn connect_bridge(args: &ListenArgs) -> CliResult<ByteStream> {
    harpwire_transport::uds::connect_bridge(&args.path)
        .map_err(|err| transport_error("connect failed", &err))
}

#[cfg(not(unix))]
fn connect_bridge(_args: &ListenArgs) -> CliResult<ByteStream> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "--unix is only supported on Unix platforms",
    ))
}
