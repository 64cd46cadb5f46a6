//! Wall clock used to pace video delivery

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::types::Timestamp;

/// Playback wall clock
///
/// All presentation timestamps are compared against the time elapsed since
/// `base`, which is taken when the dispatch loop starts. The clock is owned by
/// the dispatch thread.
#[derive(Clone, Copy)]
pub struct MediaClock {
    /// Instant playback started
    base: Instant,
}

impl MediaClock {
    /// Create a new media clock starting now
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }

    /// Create a new media clock with a specific base instant
    pub fn with_base(base: Instant) -> Self {
        Self { base }
    }

    /// Get the base instant
    pub fn base(&self) -> Instant {
        self.base
    }

    /// Wall time elapsed since playback start
    pub fn elapsed(&self) -> Duration {
        self.base.elapsed()
    }

    /// Current position of the wall clock as a timestamp
    pub fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.elapsed())
    }

    /// Block until `target` is due
    ///
    /// Sleeps in increments of at most `tick`, re-checking the elapsed time
    /// after each one. Returns early when `abort` is cancelled. Returns the
    /// total time spent waiting.
    pub fn pace(&self, target: Timestamp, tick: Duration, abort: &CancellationToken) -> Duration {
        let started = Instant::now();

        loop {
            let elapsed = self.elapsed();
            if !target.is_ahead_of(elapsed) || abort.is_cancelled() {
                break;
            }

            let remaining = Duration::from_micros((target.micros - elapsed.as_micros() as i64) as u64);
            std::thread::sleep(remaining.min(tick));
        }

        started.elapsed()
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_advances() {
        let clock = MediaClock::new();

        thread::sleep(Duration::from_millis(10));

        let now = clock.now();
        assert!(now.micros >= 10_000);
        assert!(clock.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_pace_returns_immediately_when_due() {
        let clock = MediaClock::with_base(Instant::now() - Duration::from_millis(50));
        let abort = CancellationToken::new();

        let waited = clock.pace(
            Timestamp::from_micros(20_000),
            Duration::from_millis(10),
            &abort,
        );
        assert!(waited < Duration::from_millis(5));
    }

    #[test]
    fn test_pace_waits_until_due() {
        let clock = MediaClock::new();
        let abort = CancellationToken::new();

        clock.pace(
            Timestamp::from_micros(40_000),
            Duration::from_millis(10),
            &abort,
        );
        assert!(clock.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_pace_aborts_on_cancel() {
        let clock = MediaClock::new();
        let abort = CancellationToken::new();
        abort.cancel();

        let waited = clock.pace(
            Timestamp::from_secs_f64(30.0),
            Duration::from_millis(10),
            &abort,
        );
        assert!(waited < Duration::from_secs(1));
    }
}
