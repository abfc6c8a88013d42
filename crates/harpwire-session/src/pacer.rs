//! Reproduces the original timing of a recorded capture.

use std::time::Duration;

use harpwire_frame::Timestamp;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Delays timestamped frames so they are forwarded with the cadence they were recorded at.
///
/// The first timestamped frame sets the time origin and starts the clock;
/// every later frame waits until `frame time - origin` has elapsed on the clock.
#[derive(Debug, Default)]
pub struct ReplayPacer {
    origin_ms: Option<f64>,
    clock: Option<Instant>,
}

impl ReplayPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to hold a frame recorded at `timestamp`.
    ///
    /// The first call records the origin and returns `None`.
    pub fn delay_for(&mut self, timestamp: Timestamp) -> Option<Duration> {
        let frame_ms = timestamp.as_millis_f64();
        let (Some(origin_ms), Some(clock)) = (self.origin_ms, self.clock) else {
            self.origin_ms = Some(frame_ms);
            self.clock = Some(Instant::now());
            return None;
        };

        let elapsed_ms = clock.elapsed().as_secs_f64() * 1000.0;
        let wait_ms = (frame_ms - origin_ms) - elapsed_ms;
        (wait_ms > 0.0).then(|| Duration::from_secs_f64(wait_ms / 1000.0))
    }

    /// Wait until a frame with `timestamp` is due.
    ///
    /// Frames without a timestamp are due immediately. Returns `false` if
    /// `cancel` fired before or during the wait; the frame must not be forwarded.
    pub async fn pace(&mut self, timestamp: Option<Timestamp>, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let Some(delay) = timestamp.and_then(|ts| self.delay_for(ts)) else {
            return true;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Forget the origin; the next timestamped frame starts a new clock.
    pub fn reset(&mut self) {
        self.origin_ms = None;
        self.clock = None;
    }

    /// True once a time origin has been recorded.
    pub fn is_started(&self) -> bool {
        self.origin_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_ms(ms: u32) -> Timestamp {
        // 1 tick = 32 µs, so 1 ms = 31.25 ticks; stick to whole multiples of 4 ms.
        let seconds = ms / 1000;
        let ticks = ((ms % 1000) * 1000 / 32) as u16;
        Timestamp::new(seconds, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn first_frame_is_not_delayed() {
        let mut pacer = ReplayPacer::new();
        let start = Instant::now();

        assert!(pacer.pace(Some(ts_ms(5_000)), &CancellationToken::new()).await);
        assert!(pacer.is_started());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn later_frames_wait_for_recorded_gap() {
        let mut pacer = ReplayPacer::new();
        let token = CancellationToken::new();
        let start = Instant::now();

        assert!(pacer.pace(Some(ts_ms(1_000)), &token).await);
        assert!(pacer.pace(Some(ts_ms(1_100)), &token).await);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(pacer.pace(Some(ts_ms(1_500)), &token).await);
        assert!(start.elapsed() >= Duration::from_millis(499));
        assert!(start.elapsed() < Duration::from_millis(510));
    }

    #[tokio::test(start_paused = true)]
    async fn untimestamped_and_late_frames_pass_immediately() {
        let mut pacer = ReplayPacer::new();
        let token = CancellationToken::new();

        assert!(pacer.pace(None, &token).await);
        assert!(!pacer.is_started());

        assert!(pacer.pace(Some(ts_ms(2_000)), &token).await);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let before = Instant::now();
        assert!(pacer.pace(Some(ts_ms(2_100)), &token).await);
        assert_eq!(pacer.delay_for(ts_ms(1_000)), None);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_wait() {
        let mut pacer = ReplayPacer::new();
        let token = CancellationToken::new();
        assert!(pacer.pace(Some(ts_ms(0)), &token).await);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(!pacer.pace(Some(ts_ms(60_000)), &token).await);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!pacer.pace(None, &token).await);
    }

    #[test]
    fn reset_forgets_origin() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut pacer = ReplayPacer::new();
            assert_eq!(pacer.delay_for(ts_ms(10_000)), None);
            pacer.reset();
            assert!(!pacer.is_started());
            assert_eq!(pacer.delay_for(ts_ms(0)), None);
            assert!(pacer.delay_for(ts_ms(8_000)).is_some());
        });
    }
}
