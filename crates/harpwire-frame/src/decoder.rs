//! Incremental Harp frame decoder.
//!
//! The decoder is a three-state machine:
//!
//! ```text
//!   Idle ──valid id──▶ LengthPending ──length > 0──▶ Accumulating
//!    ▲  ◀──────────── length == 0 ─────┘                  │
//!    └───────────── frame emitted / checksum failed ◀─────┘
//! ```
//!
//! A checksum failure queues every byte after the id and length fields for
//! rescanning ahead of the caller's input, so a frame hidden inside a corrupted
//! one is still found. The id and length bytes are always consumed, and the
//! queue never holds more than one frame's worth of bytes, which bounds the
//! work done per input byte. The caller's buffer is only ever advanced.

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::checksum::validate;
use crate::codec::{is_valid_id, Frame};

/// Counters describing what the decoder has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames emitted.
    pub frames: u64,
    /// Bytes discarded because they cannot start a frame.
    pub noise_bytes: u64,
    /// Candidate frames dropped for a zero length field.
    pub zero_lengths: u64,
    /// Candidate frames dropped for a bad checksum.
    pub checksum_failures: u64,
}

#[derive(Debug)]
enum DecodeState {
    Idle,
    LengthPending { id: u8 },
    Accumulating { buf: BytesMut, expected: usize },
}

/// Stateful decoder turning arbitrary byte bursts into checksum-valid frames.
///
/// Output depends only on the byte sequence, never on how it was split
/// across calls.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    /// Bytes handed back by a checksum failure, consumed before new input.
    rescan: BytesMut,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            rescan: BytesMut::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Consume bytes from `src` until one frame completes or `src` is empty.
    ///
    /// Returns `None` only once `src` has been fully drained; bytes of a
    /// partially received frame are held by the decoder until the next call.
    /// `src` is advanced, never replaced, so its allocation is kept.
    pub fn decode(&mut self, src: &mut BytesMut) -> Option<Frame> {
        loop {
            let input = if self.rescan.is_empty() {
                &mut *src
            } else {
                &mut self.rescan
            };
            if input.is_empty() {
                return None;
            }

            let complete = match std::mem::replace(&mut self.state, DecodeState::Idle) {
                DecodeState::Idle => {
                    let id = input.get_u8();
                    if is_valid_id(id) {
                        self.state = DecodeState::LengthPending { id };
                    } else {
                        self.stats.noise_bytes += 1;
                    }
                    None
                }
                DecodeState::LengthPending { id } => {
                    let length = input.get_u8();
                    if length == 0 {
                        self.stats.zero_lengths += 1;
                    } else {
                        let expected = length as usize + 2;
                        let mut buf = BytesMut::with_capacity(expected);
                        buf.put_u8(id);
                        buf.put_u8(length);
                        self.state = DecodeState::Accumulating { buf, expected };
                    }
                    None
                }
                DecodeState::Accumulating { mut buf, expected } => {
                    let take = (expected - buf.len()).min(input.len());
                    buf.extend_from_slice(&input[..take]);
                    input.advance(take);

                    if buf.len() < expected {
                        self.state = DecodeState::Accumulating { buf, expected };
                        None
                    } else {
                        Some(buf)
                    }
                }
            };

            if let Some(buf) = complete {
                if let Some(frame) = self.seal(buf) {
                    return Some(frame);
                }
            }
        }
    }

    /// Decode every frame contained in `bytes`, keeping partial state for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut src = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.decode(&mut src) {
            frames.push(frame);
        }
        frames
    }

    /// Drop any partially received frame and return to scanning for an id.
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.rescan.clear();
    }

    /// True when no partial frame is held.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Idle)
    }

    /// Bytes of the frame currently being received.
    pub fn pending_bytes(&self) -> usize {
        match &self.state {
            DecodeState::Idle => 0,
            DecodeState::LengthPending { .. } => 1,
            DecodeState::Accumulating { buf, .. } => buf.len(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn seal(&mut self, mut buf: BytesMut) -> Option<Frame> {
        if validate(&buf) {
            self.stats.frames += 1;
            return Some(Frame::from_sealed(buf.freeze()));
        }

        self.stats.checksum_failures += 1;
        debug!(
            id = buf[0],
            length = buf[1],
            "checksum mismatch, rescanning {} bytes",
            buf.len() - 2
        );

        let rewound = buf.split_off(2);
        if self.rescan.is_empty() {
            self.rescan = rewound;
        } else {
            // Failed inside a rescan: the rest of the queue follows the rewound bytes.
            let mut queue = BytesMut::with_capacity(rewound.len() + self.rescan.len());
            queue.extend_from_slice(&rewound);
            queue.extend_from_slice(&self.rescan);
            self.rescan = queue;
        }
        None
    }
}
