//! Incremental framing for the Harp binary protocol.
//!
//! This is the core layer of harpwire. Every Harp message is framed as:
//! - A 1-byte message id (category in bits 0-1, error flag in bit 3)
//! - A 1-byte length counting every byte that follows it
//! - A 3-byte header (address, port, payload type), an optional 6-byte
//!   timestamp, the payload, and a trailing modulo-256 checksum
//!
//! [`FrameDecoder`] turns arbitrary byte bursts into checksum-valid frames and
//! resynchronizes on its own after corruption. No partial reads, no buffer
//! management in user code.

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod diagnostic;
pub mod error;
pub mod payload;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod framed;

pub use checksum::{checksum, validate};
pub use codec::{
    encode_frame, is_valid_id, Frame, FrameConfig, Header, MessageType, Timestamp,
    DEFAULT_READ_CHUNK_SIZE, DEFAULT_STAGING_CAPACITY, DEVICE_PORT, ERROR_FLAG, HEADER_SIZE,
    TIMESTAMP_SIZE,
};
pub use decoder::{DecoderStats, FrameDecoder};
pub use diagnostic::{interpret_error, ProtocolError};
pub use error::{FrameError, Result};
pub use payload::{PayloadType, Scalar};
pub use reader::{FrameReader, Frames};
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use framed::HarpCodec;
