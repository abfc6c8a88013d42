/// Faults that terminate a session.
///
/// Device error replies are not faults; they arrive as
/// [`ProtocolError`](harpwire_frame::ProtocolError) diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The byte channel could not be opened or connected.
    #[error("transport error: {0}")]
    Transport(#[from] harpwire_transport::TransportError),

    /// The byte channel failed while reading.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level error from an async reader.
    #[error("frame error: {0}")]
    Frame(#[from] harpwire_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
