//! Scope-based frame rate limiting.
//!
//! A [`FramePacer`] is created at the start of a loop iteration and dropped at its end. When
//! dropped, it sleeps for whatever remains of the frame period, so the iteration never completes
//! faster than the target rate:
//!
//! ```no_run
//! # use std::num::NonZeroU32;
//! # use loopcam::pacer::FramePacer;
//! let fps = NonZeroU32::new(30).unwrap();
//! loop {
//!     let _pacer = FramePacer::new(fps);
//!     // Produce and present a frame...
//! }
//! ```
//!
//! Iterations that take longer than a frame period are not delayed further.
use std::num::NonZeroU32;
use std::thread;
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[must_use = "the pacer only waits when it goes out of scope"]
#[derive(Debug)]
pub struct FramePacer {
    frame_duration: Duration,
    frame_start: Instant,
    disabled: bool,
}

impl FramePacer {
    /// Starts a frame period of `1 / fps` seconds, from now.
    pub fn new(fps: NonZeroU32) -> Self {
        Self::from_period(Duration::from_nanos(NANOS_PER_SEC / u64::from(fps.get())))
    }

    /// Starts a frame period of arbitrary length, from now.
    pub fn from_period(frame_duration: Duration) -> Self {
        FramePacer {
            frame_duration,
            frame_start: Instant::now(),
            disabled: false,
        }
    }

    /// Prevents the pacer from sleeping when dropped.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Time spent since the start of the frame period.
    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    /// Time left until the end of the frame period, zero if it is already over.
    pub fn remaining(&self) -> Duration {
        self.frame_duration.saturating_sub(self.elapsed())
    }
}

impl Drop for FramePacer {
    fn drop(&mut self) {
        if self.disabled {
            return;
        }

        let remaining = self.remaining();
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fps(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    /// Runs one paced scope doing `work`, and returns how long the whole scope took.
    fn paced_scope(pacer: impl FnOnce() -> FramePacer, work: Duration) -> Duration {
        let start = Instant::now();
        {
            let _pacer = pacer();
            thread::sleep(work);
        }
        start.elapsed()
    }

    #[test]
    fn test_frame_duration() {
        for (rate, period) in [
            (60, Duration::from_nanos(16_666_666)),
            (30, Duration::from_nanos(33_333_333)),
            (1, Duration::from_secs(1)),
        ] {
            let mut pacer = FramePacer::new(fps(rate));
            pacer.disable();
            assert_eq!(pacer.frame_duration(), period);
        }
    }

    #[test]
    fn test_scope_lasts_one_period() {
        let elapsed = paced_scope(|| FramePacer::new(fps(60)), Duration::from_millis(5));

        assert!(elapsed >= Duration::from_nanos(16_666_666), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "{:?}", elapsed);
    }

    #[test]
    fn test_slow_work_is_not_delayed() {
        let period = Duration::from_millis(200);
        let pacer = FramePacer::from_period(period);
        thread::sleep(Duration::from_millis(250));
        assert_eq!(pacer.remaining(), Duration::ZERO);

        // Releasing the pacer must not add another period on top of the work.
        let release = Instant::now();
        drop(pacer);
        assert!(release.elapsed() < period, "{:?}", release.elapsed());
    }

    #[test]
    fn test_thirty_fps() {
        let elapsed = paced_scope(|| FramePacer::new(fps(30)), Duration::ZERO);

        assert!(elapsed >= Duration::from_nanos(33_333_333), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "{:?}", elapsed);
    }

    #[test]
    fn test_consecutive_frames() {
        let start = Instant::now();
        for _ in 0..5 {
            let _pacer = FramePacer::new(fps(100));
            thread::sleep(Duration::from_millis(2));
        }
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(50), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    }

    #[test]
    fn test_disabled_pacer_does_not_wait() {
        let elapsed = paced_scope(
            || {
                let mut pacer = FramePacer::from_period(Duration::from_secs(10));
                assert!(!pacer.is_disabled());
                pacer.disable();
                assert!(pacer.is_disabled());
                pacer
            },
            Duration::ZERO,
        );
        assert!(elapsed < Duration::from_secs(1), "{:?}", elapsed);
    }

    #[test]
    fn test_reenabled_pacer_waits() {
        let elapsed = paced_scope(
            || {
                let mut pacer = FramePacer::from_period(Duration::from_millis(20));
                pacer.disable();
                pacer.enable();
                assert!(!pacer.is_disabled());
                pacer
            },
            Duration::ZERO,
        );
        assert!(elapsed >= Duration::from_millis(20), "{:?}", elapsed);
    }

    #[test]
    fn test_remaining() {
        let mut pacer = FramePacer::from_period(Duration::from_millis(100));
        assert!(pacer.remaining() <= Duration::from_millis(100));
        assert!(pacer.elapsed() < Duration::from_millis(100));
        pacer.disable();

        let pacer = FramePacer::from_period(Duration::ZERO);
        assert_eq!(pacer.remaining(), Duration::ZERO);
    }
}
