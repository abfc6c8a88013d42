use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::ByteStream;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Connect to a Unix domain socket that bridges a live serial link
/// (for example `socat` in front of a Harp device).
pub fn connect_bridge(path: impl AsRef<Path>) -> Result<ByteStream> {
    let path = path.as_ref().to_path_buf();

    let path_bytes = path.as_os_str().len();
    if path_bytes >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path,
            len: path_bytes,
            max: MAX_PATH_LEN,
        });
    }

    if let Ok(metadata) = std::fs::symlink_metadata(&path) {
        if !metadata.file_type().is_socket() {
            return Err(TransportError::Connect {
                path: path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "existing path is not a unix socket",
                ),
            });
        }
    }

    let stream =
        std::os::unix::net::UnixStream::connect(&path).map_err(|e| TransportError::Connect {
            path: path.clone(),
            source: e,
        })?;
    debug!(?path, "connected to socket bridge");
    Ok(ByteStream::from_unix(stream, path))
}
