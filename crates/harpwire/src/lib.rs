//! Decode, validate and replay Harp device byte streams.
//!
//! harpwire turns a raw, possibly fragmented byte stream from a Harp device
//! (a live link or a recorded capture) into validated frames, recovering from
//! corruption and reporting device-side errors as readable diagnostics.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte channels (device nodes, socket bridges, capture files)
//! - [`frame`]: wire format, checksum, incremental decoder and error interpreter
//! - [`session`]: live sessions, paced replay and shared replay runs (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use harpwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use harpwire_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use harpwire_session::*;
}
