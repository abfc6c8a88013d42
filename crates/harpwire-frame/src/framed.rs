//! `tokio_util::codec` adapter for async byte sources.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::Frame;
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::FrameError;

/// Harp codec for `FramedRead` / `FramedWrite`.
///
/// Decoding never fails on corrupt input; the decoder resynchronizes on its own.
#[derive(Debug, Default)]
pub struct HarpCodec {
    decoder: FrameDecoder,
}

impl HarpCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl Decoder for HarpCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.decoder.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decoder.decode(src) {
            return Ok(Some(frame));
        }
        if !self.decoder.is_idle() {
            debug!(
                pending = self.decoder.pending_bytes(),
                "end of stream inside a frame, dropping partial bytes"
            );
            self.decoder.reset();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for HarpCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
