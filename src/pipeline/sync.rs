//! Video clock and presentation time policy

use crate::decoder::Picture;

/// Presentation clock of the video stream, in seconds
///
/// Holds the presentation time of the next expected picture. Pictures that
/// carry a timestamp reset it; pictures without one inherit it. Each picture
/// then advances the clock by its display duration.
#[derive(Debug, Clone)]
pub struct VideoClock {
    clock: f64,
    /// Nominal display duration of one picture, in seconds
    frame_delay: f64,
}

impl VideoClock {
    /// `frame_period` is the stream's nominal frame period, independent of
    /// the time base its timestamps are counted in
    pub fn new(frame_period: f64) -> Self {
        Self {
            clock: 0.0,
            frame_delay: frame_period,
        }
    }

    /// Compute the presentation time of `frame`
    ///
    /// `raw_pts` is the picture timestamp already converted to seconds. A
    /// value of zero means "unknown" and the current clock is used instead.
    /// Returns the presentation time before the clock is advanced.
    pub fn synchronize<P: Picture>(&mut self, frame: &P, raw_pts: f64) -> f64 {
        let pts = if raw_pts != 0.0 {
            self.clock = raw_pts;
            raw_pts
        } else {
            self.clock
        };

        let mut delay = self.frame_delay;
        delay += frame.repeat_pict() as f64 * (delay * 0.5);
        self.clock += delay;

        pts
    }

    /// Current value of the clock
    pub fn current(&self) -> f64 {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pic(u32);

    impl Picture for Pic {
        fn timestamp(&self) -> Option<i64> {
            None
        }

        fn repeat_pict(&self) -> u32 {
            self.0
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_adopts_nonzero_timestamp() {
        let mut clock = VideoClock::new(0.04);

        let pts = clock.synchronize(&Pic(0), 2.0);
        assert!(close(pts, 2.0));
        assert!(close(clock.current(), 2.04));
    }

    #[test]
    fn test_carries_clock_forward() {
        let mut clock = VideoClock::new(0.04);

        assert!(close(clock.synchronize(&Pic(0), 1.0), 1.0));
        assert!(close(clock.synchronize(&Pic(0), 0.0), 1.04));
        assert!(close(clock.synchronize(&Pic(0), 0.0), 1.08));
        assert!(close(clock.current(), 1.12));
    }

    #[test]
    fn test_starts_at_zero() {
        let mut clock = VideoClock::new(0.5);

        assert!(close(clock.synchronize(&Pic(0), 0.0), 0.0));
        assert!(close(clock.synchronize(&Pic(0), 0.0), 0.5));
    }

    #[test]
    fn test_repeated_picture_extends_delay() {
        let mut clock = VideoClock::new(0.04);

        clock.synchronize(&Pic(1), 1.0);
        assert!(close(clock.current(), 1.06));

        clock.synchronize(&Pic(2), 0.0);
        assert!(close(clock.current(), 1.14));
    }

    #[test]
    fn test_fine_time_base_still_advances_one_frame() {
        // 90 kHz timestamps, 25 fps content
        let mut clock = VideoClock::new(0.04);

        assert!(close(clock.synchronize(&Pic(0), 90_000.0 / 90_000.0), 1.0));
        assert!(close(clock.synchronize(&Pic(0), 0.0), 1.04));
        assert!(close(clock.synchronize(&Pic(0), 0.0), 1.08));
    }

    #[test]
    fn test_timestamp_resets_accumulated_clock() {
        let mut clock = VideoClock::new(0.04);

        clock.synchronize(&Pic(0), 0.0);
        clock.synchronize(&Pic(0), 0.0);
        assert!(close(clock.synchronize(&Pic(0), 0.5), 0.5));
        assert!(close(clock.current(), 0.54));
    }
}
