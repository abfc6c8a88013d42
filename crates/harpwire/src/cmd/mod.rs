use clap::{Args, Subcommand};
use std::path::PathBuf;

use harpwire_session::CancellationToken;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod inspect;
pub mod listen;
pub mod printer;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a live device link and print frames.
    Listen(ListenArgs),
    /// Replay a recorded capture with its original timing.
    Replay(ReplayArgs),
    /// Summarize the frames in a recorded capture.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device node (e.g. /dev/ttyACM0) or, with --unix, a socket bridge path.
    pub path: PathBuf,
    /// Treat PATH as a Unix domain socket bridge.
    #[arg(long)]
    pub unix: bool,
    /// Only show these register addresses (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub address: Option<Vec<u8>>,
    /// Exit after showing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Show error replies as frames instead of diagnostics.
    #[arg(long, env = "HARPWIRE_IGNORE_ERRORS")]
    pub ignore_errors: bool,
    /// Append every shown frame to a capture file.
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Capture file to replay.
    pub file: PathBuf,
    /// Replay as fast as the file can be read.
    #[arg(long)]
    pub no_pace: bool,
    /// Only show these register addresses (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub address: Option<Vec<u8>>,
    /// Exit after showing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Show error replies as frames instead of diagnostics.
    #[arg(long, env = "HARPWIRE_IGNORE_ERRORS")]
    pub ignore_errors: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Capture file to summarize.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Cancel `token` on Ctrl-C.
pub(crate) fn install_ctrlc_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || token.cancel())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
