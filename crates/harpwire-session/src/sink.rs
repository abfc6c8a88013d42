use std::sync::Arc;

use harpwire_frame::{Frame, ProtocolError, Timestamp};
use tracing::warn;

use crate::error::SessionError;

/// Push-style consumer of session output.
///
/// A session calls [`on_fault`](FrameSink::on_fault) or
/// [`on_completed`](FrameSink::on_completed) at most once, and nothing after it.
pub trait FrameSink {
    /// A complete, checksum-valid frame.
    fn on_frame(&mut self, frame: Frame);

    /// The device flagged a frame as an error. The session keeps running.
    fn on_diagnostic(&mut self, error: ProtocolError) {
        warn!(address = ?error.frame().address(), "{error}");
    }

    /// The byte channel failed. The session is over.
    ///
    /// The error is shared: a replay run hands the same fault to every subscriber.
    fn on_fault(&mut self, error: Arc<SessionError>);

    /// The byte channel reached end of stream. The session is over.
    fn on_completed(&mut self);
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn on_frame(&mut self, frame: Frame) {
        (**self).on_frame(frame);
    }

    fn on_diagnostic(&mut self, error: ProtocolError) {
        (**self).on_diagnostic(error);
    }

    fn on_fault(&mut self, error: Arc<SessionError>) {
        (**self).on_fault(error);
    }

    fn on_completed(&mut self) {
        (**self).on_completed();
    }
}

/// Session output as a value, for channel-based consumers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame(Frame),
    Diagnostic(ProtocolError),
    Fault(Arc<SessionError>),
    Completed,
}

impl SessionEvent {
    /// True for the events that end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Fault(_) | SessionEvent::Completed)
    }

    /// Push this event into `sink`.
    pub fn forward_to<S: FrameSink + ?Sized>(self, sink: &mut S) {
        match self {
            SessionEvent::Frame(frame) => sink.on_frame(frame),
            SessionEvent::Diagnostic(error) => sink.on_diagnostic(error),
            SessionEvent::Fault(error) => sink.on_fault(error),
            SessionEvent::Completed => sink.on_completed(),
        }
    }
}

impl FrameSink for std::sync::mpsc::Sender<SessionEvent> {
    fn on_frame(&mut self, frame: Frame) {
        let _ = self.send(SessionEvent::Frame(frame));
    }

    fn on_diagnostic(&mut self, error: ProtocolError) {
        let _ = self.send(SessionEvent::Diagnostic(error));
    }

    fn on_fault(&mut self, error: Arc<SessionError>) {
        let _ = self.send(SessionEvent::Fault(error));
    }

    fn on_completed(&mut self) {
        let _ = self.send(SessionEvent::Completed);
    }
}

/// A decoded frame routed either as data or as a device error report.
#[derive(Debug, Clone)]
pub enum Delivery {
    Frame(Frame),
    Diagnostic(ProtocolError),
}

impl Delivery {
    /// Route `frame`: error-flagged frames become diagnostics unless `ignore_errors`.
    pub fn classify(frame: Frame, ignore_errors: bool) -> Self {
        if frame.is_error() && !ignore_errors {
            Delivery::Diagnostic(ProtocolError::from_frame(frame))
        } else {
            Delivery::Frame(frame)
        }
    }

    pub fn frame(&self) -> &Frame {
        match self {
            Delivery::Frame(frame) => frame,
            Delivery::Diagnostic(error) => error.frame(),
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.frame().timestamp()
    }

    pub fn deliver<S: FrameSink + ?Sized>(self, sink: &mut S) {
        match self {
            Delivery::Frame(frame) => sink.on_frame(frame),
            Delivery::Diagnostic(error) => sink.on_diagnostic(error),
        }
    }

    pub fn into_event(self) -> SessionEvent {
        match self {
            Delivery::Frame(frame) => SessionEvent::Frame(frame),
            Delivery::Diagnostic(error) => SessionEvent::Diagnostic(error),
        }
    }
}
