//! Sessions over Harp byte channels.
//!
//! This is the "just works" layer. Feed a live link or replay a recorded
//! capture, and receive validated frames, device error reports and faults on
//! a push-style [`FrameSink`].
//!
//! - [`TransportSession`] drives the decoder from "bytes available" notifications
//!   or a blocking read loop, optionally on a reader thread so cancellation
//!   never waits on a silent device.
//! - [`replay_capture`] replays a capture with its original inter-frame timing.
//! - [`ReplayRegistry`] shares one replay run per capture file among subscribers.

pub mod config;
pub mod error;
pub mod pacer;
pub mod registry;
pub mod replay;
pub mod session;
pub mod sink;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use pacer::ReplayPacer;
pub use registry::{ReplayRegistry, Subscription};
pub use replay::{replay_capture, replay_from, CaptureReplay};
pub use session::{SessionState, TransportSession};
pub use sink::{Delivery, FrameSink, SessionEvent};

pub use tokio_util::sync::CancellationToken;
