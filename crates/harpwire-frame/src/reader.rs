use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{Frame, FrameConfig};
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads and corruption internally; callers always get
/// complete, checksum-valid frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    chunk: Vec<u8>,
    decoder: FrameDecoder,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(config.staging_capacity),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            decoder: FrameDecoder::new(),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. Bytes of
    /// an unfinished frame at EOF are dropped.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf) {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&self.chunk[..read]);
        }
    }

    /// Iterate frames until EOF or the first I/O error.
    pub fn frames(&mut self) -> Frames<'_, T> {
        Frames { reader: self }
    }

    /// Decoder counters accumulated so far.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Iterator over the frames of a [`FrameReader`].
///
/// Ends at EOF; yields an error item once on I/O failure and then ends.
pub struct Frames<'a, T> {
    reader: &'a mut FrameReader<T>,
}

impl<T: Read> Iterator for Frames<'_, T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, Header, MessageType};
    use crate::payload::PayloadType;

    fn wire(frames: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (address, payload) in frames {
            let header = Header::new(MessageType::Event, *address, PayloadType::U8);
            encode_frame(&header, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[(0x20, b"hi")])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.address(), Some(0x20));
        assert_eq!(frame.payload(), b"hi");
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[
            (1, b"one"),
            (2, b"two"),
            (3, b"three"),
        ])));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.address(), f1.payload()), (Some(1), b"one".as_ref()));
        assert_eq!((f2.address(), f2.payload()), (Some(2), b"two".as_ref()));
        assert_eq!((f3.address(), f3.payload()), (Some(3), b"three".as_ref()));
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[(4, b"slow"), (5, b"er")]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.address(), Some(4));
        assert_eq!(frame.payload(), b"slow");
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload(), b"er");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut bytes = wire(&[(2, b"only-part")]);
        bytes.truncate(6);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn garbage_between_frames_is_skipped() {
        let mut bytes = vec![0xFF, 0xEE];
        bytes.extend(wire(&[(9, b"a")]));
        bytes.extend([0x40, 0x50]);
        bytes.extend(wire(&[(10, b"b")]));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frames: Vec<_> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].address(), Some(10));
        assert_eq!(reader.stats().noise_bytes, 4);
    }

    #[test]
    fn small_read_chunks() {
        let cfg = FrameConfig {
            staging_capacity: 16,
            read_chunk_size: 3,
        };
        let mut reader =
            FrameReader::with_config(Cursor::new(wire(&[(1, b"abcdefgh"), (2, b"i")])), cfg);
        assert_eq!(reader.frames().count(), 2);
        assert_eq!(reader.config().read_chunk_size, 3);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = FailThenData {
            kind: ErrorKind::WouldBlock,
            failed: false,
            bytes: wire(&[(7, b"ok")]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = FailThenData {
            kind: ErrorKind::Interrupted,
            failed: false,
            bytes: wire(&[(8, b"ok")]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.address(), Some(8));
        assert_eq!(frame.payload(), b"ok");
    }

    #[test]
    fn frames_iterator_yields_io_error_once() {
        let reader = FailThenData {
            kind: ErrorKind::BrokenPipe,
            failed: false,
            bytes: Vec::new(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let mut frames = framed.frames();
        assert!(matches!(frames.next(), Some(Err(FrameError::Io(_)))));
        assert!(frames.next().is_none());
    }

    struct FailThenData {
        kind: ErrorKind,
        failed: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for FailThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
