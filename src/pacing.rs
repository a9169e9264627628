//! Time, frame pacing and retry policy for the processing loops.
//!
//! Loops never call `std::thread::sleep` or `Instant::now` directly; they go
//! through a `Clock` so pacing and backoff can be driven by `ManualClock` in
//! tests without real waiting.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
/// Slowest and fastest frame rates a loop will pace to.
pub const MIN_FPS: f64 = 0.01;
pub const MAX_FPS: f64 = 1000.0;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
    /// Local time of day formatted as `HH:MM:SS`.
    fn time_of_day(&self) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn time_of_day(&self) -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }
}

/// Deterministic clock. `sleep` advances time instantly and is recorded.
#[derive(Clone, Debug)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Debug)]
struct ManualInner {
    origin: Instant,
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualInner {
                origin: Instant::now(),
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move time forward without recording a sleep (simulates work).
    pub fn advance(&self, by: Duration) {
        self.with(|inner| inner.elapsed += by);
    }

    pub fn elapsed(&self) -> Duration {
        self.with(|inner| inner.elapsed)
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.with(|inner| inner.sleeps.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut ManualInner) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.with(|inner| inner.origin + inner.elapsed)
    }

    fn sleep(&self, duration: Duration) {
        self.with(|inner| {
            inner.elapsed += duration;
            inner.sleeps.push(duration);
        });
    }

    fn time_of_day(&self) -> String {
        let secs = self.with(|inner| inner.elapsed.as_secs());
        format!(
            "{:02}:{:02}:{:02}",
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60
        )
    }
}

/// "Measure elapsed, sleep the remainder" pacing at a nominal frame interval.
///
/// Work that overruns the interval is never compensated by dropping frames;
/// the loop simply proceeds immediately and falls behind wall-clock time.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    checkpoint: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            checkpoint: None,
        }
    }

    /// Build from a frames-per-second value; see `frame_interval`.
    pub fn from_fps(fps: f64, fallback_fps: f64) -> Result<Self> {
        Ok(Self::new(frame_interval(fps, fallback_fps)?))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the start of the pacing window.
    pub fn start(&mut self, clock: &dyn Clock) {
        self.checkpoint = Some(clock.now());
    }

    /// Sleep until one interval has passed since the last checkpoint, then
    /// reset the checkpoint. Returns the time slept.
    pub fn pace(&mut self, clock: &dyn Clock) -> Duration {
        let now = clock.now();
        let checkpoint = *self.checkpoint.get_or_insert(now);
        let elapsed = now.saturating_duration_since(checkpoint);
        let slept = match self.interval.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => {
                clock.sleep(remaining);
                remaining
            }
            _ => Duration::ZERO,
        };
        self.checkpoint = Some(clock.now());
        slept
    }
}

pub fn fps_in_range(fps: f64) -> bool {
    (MIN_FPS..=MAX_FPS).contains(&fps)
}

/// Nominal interval for `fps`. Non-finite or non-positive rates fall back to
/// `fallback_fps`; a rate outside `MIN_FPS..=MAX_FPS` is an error.
pub fn frame_interval(fps: f64, fallback_fps: f64) -> Result<Duration> {
    let fps = if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        fallback_fps
    };
    if !fps_in_range(fps) {
        return Err(anyhow!(
            "frame rate {} is outside {}..={} fps",
            fps,
            MIN_FPS,
            MAX_FPS
        ));
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .map_err(|e| anyhow!("frame rate {} has no representable interval: {}", fps, e))
}

/// What to do after a failed iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the backoff and try again.
    Retry(Duration),
    /// Budget exhausted.
    GiveUp,
}

/// Backoff after transient failures, with an optional budget of consecutive
/// failures. `max_consecutive: None` retries forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_consecutive: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_RETRY_BACKOFF,
            max_consecutive: None,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(backoff: Duration, max_consecutive: u32) -> Result<Self> {
        if max_consecutive == 0 {
            return Err(anyhow!("retry budget must allow at least one failure"));
        }
        Ok(Self {
            backoff,
            max_consecutive: Some(max_consecutive),
        })
    }

    /// Decide after the `consecutive`-th failure in a row (1-based).
    pub fn decide(&self, consecutive: u32) -> RetryDecision {
        match self.max_consecutive {
            Some(max) if consecutive >= max => RetryDecision::GiveUp,
            _ => RetryDecision::Retry(self.backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleeps_the_remainder_of_the_interval() {
        let clock = ManualClock::new();
        let mut pacer = FramePacer::new(Duration::from_millis(40));
        pacer.start(&clock);

        clock.advance(Duration::from_millis(15));
        assert_eq!(pacer.pace(&clock), Duration::from_millis(25));
        assert_eq!(clock.elapsed(), Duration::from_millis(40));

        clock.advance(Duration::from_millis(39));
        assert_eq!(pacer.pace(&clock), Duration::from_millis(1));
        assert_eq!(clock.elapsed(), Duration::from_millis(80));
    }

    #[test]
    fn overrun_proceeds_without_sleeping_or_catching_up() {
        let clock = ManualClock::new();
        let mut pacer = FramePacer::new(Duration::from_millis(40));
        pacer.start(&clock);

        clock.advance(Duration::from_millis(100));
        assert_eq!(pacer.pace(&clock), Duration::ZERO);

        // the next window starts from the overrun, not from the schedule
        clock.advance(Duration::from_millis(10));
        assert_eq!(pacer.pace(&clock), Duration::from_millis(30));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(30)]);
    }

    #[test]
    fn exact_interval_does_not_sleep() {
        let clock = ManualClock::new();
        let mut pacer = FramePacer::new(Duration::from_millis(40));
        pacer.start(&clock);
        clock.advance(Duration::from_millis(40));
        assert_eq!(pacer.pace(&clock), Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn invalid_fps_uses_fallback() {
        assert_eq!(frame_interval(25.0, 30.0).unwrap(), Duration::from_millis(40));
        assert_eq!(frame_interval(0.0, 25.0).unwrap(), Duration::from_millis(40));
        assert_eq!(frame_interval(f64::NAN, 25.0).unwrap(), Duration::from_millis(40));
        assert_eq!(
            FramePacer::from_fps(-1.0, 25.0).unwrap().interval(),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn extreme_fps_is_an_error_not_a_panic() {
        assert!(frame_interval(5e-324, 30.0).is_err());
        assert!(frame_interval(1e-20, 30.0).is_err());
        assert!(frame_interval(1e9, 30.0).is_err());
        assert!(frame_interval(f64::NAN, 1e-30).is_err());
        assert!(FramePacer::from_fps(1e-19, 30.0).is_err());
        let slowest = frame_interval(MIN_FPS, 30.0).unwrap();
        assert!((slowest.as_secs_f64() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn retry_budget_counts_consecutive_failures() {
        let unbounded = RetryPolicy::default();
        assert_eq!(unbounded.decide(10_000), RetryDecision::Retry(DEFAULT_RETRY_BACKOFF));

        let bounded = RetryPolicy::bounded(Duration::from_millis(5), 3).unwrap();
        assert_eq!(bounded.decide(1), RetryDecision::Retry(Duration::from_millis(5)));
        assert_eq!(bounded.decide(2), RetryDecision::Retry(Duration::from_millis(5)));
        assert_eq!(bounded.decide(3), RetryDecision::GiveUp);
        assert!(RetryPolicy::bounded(Duration::ZERO, 0).is_err());
    }

    #[test]
    fn manual_clock_formats_time_of_day() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(3600 + 2 * 60 + 3));
        assert_eq!(clock.time_of_day(), "01:02:03");
    }
}
