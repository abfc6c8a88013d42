use std::path::PathBuf;

/// Errors that can occur while opening or reading a byte channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a device node or capture file.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a socket bridge.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the byte channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The path exists but is not something bytes can be read from.
    #[error("not a readable byte source: {path}")]
    NotReadable { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, TransportError>;
