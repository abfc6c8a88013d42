use std::io::{self, ErrorKind, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use bytes::BytesMut;
use harpwire_frame::{DecoderStats, FrameDecoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::sink::{Delivery, FrameSink};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting bytes.
    Active,
    /// End of stream was reported to the sink.
    Completed,
    /// A channel fault was reported to the sink.
    Faulted,
    /// Stopped by cancellation; the sink was not notified.
    Cancelled,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self == SessionState::Active
    }
}

/// Decodes a live byte channel into a [`FrameSink`].
///
/// Bytes are pushed in with [`on_bytes_available`](Self::on_bytes_available),
/// which never blocks, or pulled from a blocking source by [`run`](Self::run)
/// on the calling thread or by [`run_detached`](Self::run_detached) on a
/// reader thread.
pub struct TransportSession<S> {
    decoder: FrameDecoder,
    staging: BytesMut,
    sink: S,
    config: SessionConfig,
    state: SessionState,
}

impl<S: FrameSink> TransportSession<S> {
    /// Create a session with default configuration.
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, SessionConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(sink: S, config: SessionConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            staging: BytesMut::with_capacity(config.staging_capacity),
            sink,
            config,
            state: SessionState::Active,
        }
    }

    /// Decode a burst of newly arrived bytes and dispatch every completed frame.
    ///
    /// Returns the number of frames and diagnostics dispatched. Bytes arriving
    /// after the session ended are ignored.
    pub fn on_bytes_available(&mut self, bytes: &[u8]) -> usize {
        if !self.state.is_active() {
            trace!(len = bytes.len(), state = ?self.state, "ignoring bytes after session end");
            return 0;
        }

        self.staging.extend_from_slice(bytes);
        let mut dispatched = 0;
        while let Some(frame) = self.decoder.decode(&mut self.staging) {
            Delivery::classify(frame, self.config.ignore_errors).deliver(&mut self.sink);
            dispatched += 1;
        }
        dispatched
    }

    /// Report a channel fault. Only the first terminal event reaches the sink.
    pub fn on_fault(&mut self, error: SessionError) {
        if !self.state.is_active() {
            return;
        }
        debug!(%error, "session faulted");
        self.state = SessionState::Faulted;
        self.sink.on_fault(Arc::new(error));
    }

    /// Report end of stream. Only the first terminal event reaches the sink.
    pub fn on_end_of_stream(&mut self) {
        if !self.state.is_active() {
            return;
        }
        if !self.decoder.is_idle() {
            debug!(
                pending = self.decoder.pending_bytes(),
                "end of stream inside a frame, dropping partial bytes"
            );
        }
        self.state = SessionState::Completed;
        self.sink.on_completed();
    }

    /// Stop without notifying the sink.
    pub fn cancel(&mut self) {
        if self.state.is_active() {
            self.state = SessionState::Cancelled;
        }
    }

    /// Pull bytes from a blocking source until EOF, a fault, or cancellation.
    ///
    /// Timeouts from sources with a read timeout are treated as "no bytes yet"
    /// so the token is checked regularly.
    pub fn run<R: Read>(&mut self, mut source: R, cancel: &CancellationToken) -> SessionState {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];

        while self.state.is_active() {
            if cancel.is_cancelled() {
                self.cancel();
                break;
            }

            match source.read(&mut chunk) {
                Ok(0) => self.on_end_of_stream(),
                Ok(n) => {
                    if cancel.is_cancelled() {
                        self.cancel();
                        break;
                    }
                    self.on_bytes_available(&chunk[..n]);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(err) => self.on_fault(SessionError::Io(err)),
            }
        }

        self.state
    }

    /// Pull bytes from a blocking source on a reader thread.
    ///
    /// Decoding and sink calls stay on the calling thread, which checks
    /// `cancel` every `config.poll_interval` even while the source is silent.
    /// A reader blocked in `read` when the session stops is left to exit on
    /// its next read; it drops the source then.
    pub fn run_detached<R>(&mut self, source: R, cancel: &CancellationToken) -> SessionState
    where
        R: Read + Send + 'static,
    {
        if !self.state.is_active() {
            return self.state;
        }

        let (tx, rx) = mpsc::sync_channel(READ_AHEAD_CHUNKS);
        let chunk_size = self.config.read_chunk_size.max(1);
        let spawned = thread::Builder::new()
            .name("harpwire-reader".into())
            .spawn(move || read_chunks(source, chunk_size, &tx));
        if let Err(err) = spawned {
            self.on_fault(SessionError::Io(err));
            return self.state;
        }

        while self.state.is_active() {
            if cancel.is_cancelled() {
                self.cancel();
                break;
            }

            match rx.recv_timeout(self.config.poll_interval) {
                Ok(ReadEvent::Bytes(bytes)) => {
                    if cancel.is_cancelled() {
                        self.cancel();
                        break;
                    }
                    self.on_bytes_available(&bytes);
                }
                Ok(ReadEvent::Eof) => self.on_end_of_stream(),
                Ok(ReadEvent::Failed(err)) => self.on_fault(SessionError::Io(err)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("reader thread exited without reporting end of stream");
                    self.on_fault(SessionError::Io(io::Error::new(
                        ErrorKind::BrokenPipe,
                        "reader thread exited",
                    )));
                }
            }
        }

        self.state
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Decoder counters accumulated so far.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Chunks read ahead of the decoder by a detached reader.
const READ_AHEAD_CHUNKS: usize = 16;

enum ReadEvent {
    Bytes(Vec<u8>),
    Eof,
    Failed(io::Error),
}

fn read_chunks<R: Read>(mut source: R, chunk_size: usize, tx: &mpsc::SyncSender<ReadEvent>) {
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let event = match source.read(&mut chunk) {
            Ok(0) => ReadEvent::Eof,
            Ok(n) => ReadEvent::Bytes(chunk[..n].to_vec()),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(err) => ReadEvent::Failed(err),
        };

        let last = !matches!(event, ReadEvent::Bytes(_));
        if tx.send(event).is_err() || last {
            trace!("reader thread exiting");
            return;
        }
    }
}
