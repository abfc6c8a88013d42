use std::fs::File;
use std::sync::Arc;

use harpwire_frame::{Frame, FrameWriter, ProtocolError};
use harpwire_session::{CancellationToken, FrameSink, SessionError};
use tracing::{debug, warn};

use crate::exit::{frame_error, session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_diagnostic, print_frame, OutputFormat};

/// Prints session output and stops the session once `count` items were shown.
pub struct FramePrinter {
    format: OutputFormat,
    addresses: Option<Vec<u8>>,
    count: Option<usize>,
    printed: usize,
    stop: CancellationToken,
    record: Option<FrameWriter<File>>,
    failure: Option<CliError>,
}

impl FramePrinter {
    pub fn new(
        format: OutputFormat,
        addresses: Option<Vec<u8>>,
        count: Option<usize>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            format,
            addresses,
            count,
            printed: 0,
            stop,
            record: None,
            failure: None,
        }
    }

    /// Also append every shown frame to a capture file.
    pub fn record_to(mut self, writer: FrameWriter<File>) -> Self {
        self.record = Some(writer);
        self
    }

    pub fn printed(&self) -> usize {
        self.printed
    }

    /// Exit code for the command, or the first failure seen.
    pub fn finish(self) -> CliResult<i32> {
        if let Some(writer) = &self.record {
            debug!(frames = writer.frames_written(), "capture recorded");
        }
        match self.failure {
            Some(err) => Err(err),
            None => Ok(SUCCESS),
        }
    }

    fn wants(&self, frame: &Frame) -> bool {
        match (&self.addresses, frame.address()) {
            (None, _) => true,
            (Some(addresses), Some(address)) => addresses.contains(&address),
            (Some(_), None) => false,
        }
    }

    fn shown(&mut self, frame: &Frame) {
        if let Some(writer) = self.record.as_mut() {
            if let Err(err) = writer.write_frame(frame) {
                self.fail(frame_error("recording failed", &err));
                return;
            }
        }

        self.printed = self.printed.saturating_add(1);
        if self.count.is_some_and(|count| self.printed >= count) {
            self.stop.cancel();
        }
    }

    fn fail(&mut self, err: CliError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        self.stop.cancel();
    }
}

impl FrameSink for FramePrinter {
    fn on_frame(&mut self, frame: Frame) {
        if self.stop.is_cancelled() || !self.wants(&frame) {
            return;
        }
        print_frame(&frame, self.format);
        self.shown(&frame);
    }

    fn on_diagnostic(&mut self, error: ProtocolError) {
        if self.stop.is_cancelled() || !self.wants(error.frame()) {
            return;
        }
        warn!(address = ?error.frame().address(), "device reported an error");
        print_diagnostic(&error, self.format);
        self.shown(error.frame());
    }

    fn on_fault(&mut self, error: Arc<SessionError>) {
        self.fail(session_error("stream failed", &error));
    }

    fn on_completed(&mut self) {
        debug!(printed = self.printed, "end of stream");
    }
}
