use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use harpwire_frame::{DecoderStats, HarpCodec};
use harpwire_transport::TransportError;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::pacer::ReplayPacer;
use crate::session::SessionState;
use crate::sink::{Delivery, FrameSink, SessionEvent};

/// Pull-style replay of a recorded byte stream.
///
/// Each call to [`next_event`](Self::next_event) decodes, classifies and paces
/// one frame. The producer only advances when the consumer asks for more.
pub struct CaptureReplay<R> {
    framed: FramedRead<R, HarpCodec>,
    pacer: ReplayPacer,
    ignore_errors: bool,
    pace: bool,
    finished: bool,
}

impl CaptureReplay<tokio::fs::File> {
    /// Open a capture file for replay.
    pub async fn open(path: &Path, config: &SessionConfig) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file, config))
    }
}

impl<R: AsyncRead + Unpin> CaptureReplay<R> {
    pub fn new(reader: R, config: &SessionConfig) -> Self {
        Self {
            framed: FramedRead::with_capacity(reader, HarpCodec::new(), config.staging_capacity),
            pacer: ReplayPacer::new(),
            ignore_errors: config.ignore_errors,
            pace: config.pace,
            finished: false,
        }
    }

    /// Next event of the replay, held back until its recorded time is due.
    ///
    /// The last event is `Completed` or `Fault`; after it, and on
    /// cancellation, this returns `None`.
    pub async fn next_event(&mut self, cancel: &CancellationToken) -> Option<SessionEvent> {
        if self.finished {
            return None;
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            next = self.framed.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                self.finished = true;
                return Some(SessionEvent::Fault(Arc::new(SessionError::Frame(err))));
            }
            None => {
                debug!(stats = ?self.stats(), "capture exhausted");
                self.finished = true;
                return Some(SessionEvent::Completed);
            }
        };

        let delivery = Delivery::classify(frame, self.ignore_errors);
        if self.pace && !self.pacer.pace(delivery.timestamp(), cancel).await {
            return None;
        }
        if cancel.is_cancelled() {
            return None;
        }
        Some(delivery.into_event())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decoder counters accumulated so far.
    pub fn stats(&self) -> DecoderStats {
        self.framed.decoder().stats()
    }
}

/// Replay a recorded capture file into `sink`.
///
/// Frames are delivered with their recorded inter-frame timing unless
/// `config.pace` is off. Ends with exactly one of `on_completed` or `on_fault`,
/// or with no terminal call at all when cancelled.
pub async fn replay_capture<S: FrameSink>(
    path: impl AsRef<Path>,
    sink: &mut S,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> SessionState {
    let path = path.as_ref();
    let mut replay = match CaptureReplay::open(path, config).await {
        Ok(replay) => replay,
        Err(err) => {
            sink.on_fault(Arc::new(err));
            return SessionState::Faulted;
        }
    };

    info!(?path, pace = config.pace, "replaying capture");
    let state = drive(&mut replay, sink, cancel).await;
    info!(?path, ?state, "replay finished");
    state
}

/// Replay frames decoded from any async byte source into `sink`.
pub async fn replay_from<R, S>(
    reader: R,
    sink: &mut S,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> SessionState
where
    R: AsyncRead + Unpin,
    S: FrameSink,
{
    drive(&mut CaptureReplay::new(reader, config), sink, cancel).await
}

async fn drive<R, S>(
    replay: &mut CaptureReplay<R>,
    sink: &mut S,
    cancel: &CancellationToken,
) -> SessionState
where
    R: AsyncRead + Unpin,
    S: FrameSink,
{
    while let Some(event) = replay.next_event(cancel).await {
        let state = match event {
            SessionEvent::Fault(_) => SessionState::Faulted,
            SessionEvent::Completed => SessionState::Completed,
            _ => SessionState::Active,
        };
        event.forward_to(sink);
        if !state.is_active() {
            return state;
        }
    }
    SessionState::Cancelled
}
