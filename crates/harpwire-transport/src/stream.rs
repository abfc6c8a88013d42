use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// What kind of byte channel a [`ByteStream`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// A live device node. Line settings are left to the operating system.
    Device,
    /// A recorded capture on disk. Reaching EOF ends the stream.
    Capture,
    /// A Unix domain socket bridging to a live link.
    #[cfg(unix)]
    Unix,
}

impl StreamKind {
    /// Channel name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Device => "device",
            StreamKind::Capture => "capture",
            #[cfg(unix)]
            StreamKind::Unix => "unix-socket",
        }
    }
}

/// An open byte channel, read with `std::io::Read`.
///
/// Reads block until bytes arrive; callers that need to stop on demand read
/// from a dedicated thread.
pub struct ByteStream {
    inner: ByteStreamInner,
    path: PathBuf,
}

enum ByteStreamInner {
    File { file: File, kind: StreamKind },
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl ByteStream {
    /// Open a live device node for reading and writing.
    pub fn open_device(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "opened device node");
        Ok(Self {
            inner: ByteStreamInner::File {
                file,
                kind: StreamKind::Device,
            },
            path,
        })
    }

    /// Open a recorded capture for reading.
    pub fn open_capture(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|source| TransportError::Open {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            return Err(TransportError::NotReadable { path });
        }
        let file = File::open(&path).map_err(|source| TransportError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(?path, bytes = metadata.len(), "opened capture");
        Ok(Self {
            inner: ByteStreamInner::File {
                file,
                kind: StreamKind::Capture,
            },
            path,
        })
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream, path: PathBuf) -> Self {
        Self {
            inner: ByteStreamInner::Unix(stream),
            path,
        }
    }

    /// The kind of channel behind this stream.
    pub fn kind(&self) -> StreamKind {
        match &self.inner {
            ByteStreamInner::File { kind, .. } => *kind,
            #[cfg(unix)]
            ByteStreamInner::Unix(_) => StreamKind::Unix,
        }
    }

    /// The path this stream was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ByteStreamInner::File { file, .. } => file.read(buf),
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("kind", &self.kind().name())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "harpwire-transport-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn capture_reads_file_contents() {
        let dir = temp_dir("capture");
        let path = dir.join("session.bin");
        std::fs::write(&path, [0x02, 0x04, 0x20, 0xFF, 0x01]).unwrap();

        let mut stream = ByteStream::open_capture(&path).unwrap();
        assert_eq!(stream.kind(), StreamKind::Capture);
        assert_eq!(stream.path(), path.as_path());

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x02, 0x04, 0x20, 0xFF, 0x01]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn capture_missing_file_is_open_error() {
        let err = ByteStream::open_capture("/nonexistent/harpwire/capture.bin").unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn capture_rejects_directory() {
        let dir = temp_dir("dir");
        let err = ByteStream::open_capture(&dir).unwrap_err();
        assert!(matches!(err, TransportError::NotReadable { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn device_reads_node_contents() {
        let dir = temp_dir("device");
        let path = dir.join("fake-tty");
        std::fs::write(&path, [0x03, 0x04]).unwrap();

        let mut stream = ByteStream::open_device(&path).unwrap();
        assert_eq!(stream.kind(), StreamKind::Device);
        assert!(format!("{stream:?}").contains("device"));

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x03, 0x04]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn device_missing_node_is_open_error() {
        let err = ByteStream::open_device("/nonexistent/harpwire/ttyACM0").unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}
