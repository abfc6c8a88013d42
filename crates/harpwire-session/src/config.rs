use std::time::Duration;

use harpwire_frame::{DEFAULT_READ_CHUNK_SIZE, DEFAULT_STAGING_CAPACITY};

/// Default capacity of each replay subscriber's queue, in events.
pub const DEFAULT_REPLAY_CHANNEL_CAPACITY: usize = 1024;

/// Default interval at which a detached read loop checks for cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration shared by live sessions and capture replay.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Forward error-flagged frames untouched instead of reporting diagnostics.
    pub ignore_errors: bool,
    /// Initial capacity of the staging buffer. Default: 1 MiB.
    pub staging_capacity: usize,
    /// Maximum bytes requested from a blocking source per read. Default: 8 KiB.
    pub read_chunk_size: usize,
    /// Events queued per replay subscriber before the run waits for it.
    pub replay_channel_capacity: usize,
    /// Reproduce the original inter-frame timing during replay.
    pub pace: bool,
    /// How often [`run_detached`](crate::TransportSession::run_detached) checks
    /// for cancellation while the source is silent.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ignore_errors: false,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            replay_channel_capacity: DEFAULT_REPLAY_CHANNEL_CAPACITY,
            pace: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
