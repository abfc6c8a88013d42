/// Errors that can occur while building, reading or writing frames.
///
/// Corruption in an incoming byte stream is never an error: the decoder
/// discards it and resynchronizes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame bytes do not form a well-formed Harp message.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// The frame would not fit the one-byte length field.
    #[error("frame too large ({size} bytes after length field, max {max})")]
    TooLarge { size: usize, max: usize },

    /// The trailing checksum byte does not match the frame contents.
    #[error("checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source reached end of stream.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
