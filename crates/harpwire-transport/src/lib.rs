//! Byte channel abstraction for Harp devices.
//!
//! Provides a unified [`ByteStream`] over the places Harp bytes come from:
//! - Device nodes (`/dev/ttyACM0`, ...) opened read/write with no line configuration
//! - Unix domain socket bridges in front of a serial link
//! - Recorded binary captures replayed from disk
//!
//! This is the lowest layer of harpwire. Framing and sessions build on top of
//! the [`ByteStream`] type provided here.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{ByteStream, StreamKind};
