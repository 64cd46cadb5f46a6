//! Health monitoring and metrics for playback

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Health metrics for a playback session
///
/// Written by the dispatch thread and the audio callback thread, read by the
/// monitor. All fields use atomic operations for thread-safe access.
pub struct PlaybackHealth {
    /// Pictures produced by the video decoder
    pub video_frames_decoded: AtomicU64,

    /// Pictures converted and handed to the presentation sink
    pub video_frames_delivered: AtomicU64,

    /// Video packets or pictures lost to decode/convert errors
    pub video_decode_failures: AtomicU64,

    /// Audio packets accepted by the packet queue
    pub audio_packets_queued: AtomicU64,

    /// Audio packets dropped because the queue could not take them
    pub audio_packets_dropped: AtomicU64,

    /// Audio frames decoded and staged for the device
    pub audio_frames_decoded: AtomicU64,

    /// Times the audio callback had to synthesize silence
    pub silence_fills: AtomicU64,

    /// Audio frames cut short because they did not fit the staging buffer
    pub audio_frames_truncated: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last delivered video frame
    pub last_frame_time: AtomicU64,
}

impl PlaybackHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            video_frames_decoded: AtomicU64::new(0),
            video_frames_delivered: AtomicU64::new(0),
            video_decode_failures: AtomicU64::new(0),
            audio_packets_queued: AtomicU64::new(0),
            audio_packets_dropped: AtomicU64::new(0),
            audio_frames_decoded: AtomicU64::new(0),
            silence_fills: AtomicU64::new(0),
            audio_frames_truncated: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(now_micros()),
        }
    }

    pub fn record_video_decoded(&self) {
        self.video_frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame handed to the sink
    pub fn record_video_delivered(&self) {
        self.last_frame_time.store(now_micros(), Ordering::Relaxed);
        self.video_frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_video_failure(&self) {
        self.video_decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_queued(&self) {
        self.audio_packets_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_dropped(&self) {
        self.audio_packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_decoded(&self) {
        self.audio_frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_silence_fill(&self) {
        self.silence_fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_truncated(&self) {
        self.audio_frames_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn video_frames_decoded(&self) -> u64 {
        self.video_frames_decoded.load(Ordering::Relaxed)
    }

    pub fn video_frames_delivered(&self) -> u64 {
        self.video_frames_delivered.load(Ordering::Relaxed)
    }

    pub fn video_decode_failures(&self) -> u64 {
        self.video_decode_failures.load(Ordering::Relaxed)
    }

    pub fn audio_packets_queued(&self) -> u64 {
        self.audio_packets_queued.load(Ordering::Relaxed)
    }

    pub fn audio_packets_dropped(&self) -> u64 {
        self.audio_packets_dropped.load(Ordering::Relaxed)
    }

    pub fn audio_frames_decoded(&self) -> u64 {
        self.audio_frames_decoded.load(Ordering::Relaxed)
    }

    pub fn silence_fills(&self) -> u64 {
        self.silence_fills.load(Ordering::Relaxed)
    }

    pub fn audio_frames_truncated(&self) -> u64 {
        self.audio_frames_truncated.load(Ordering::Relaxed)
    }

    /// Get the timestamp of the last delivered frame (Unix microseconds)
    pub fn last_frame_time(&self) -> u64 {
        self.last_frame_time.load(Ordering::Relaxed)
    }

    /// Check if video delivery has stalled (no frames for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let elapsed_micros = now_micros().saturating_sub(self.last_frame_time());
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            video_frames_decoded: self.video_frames_decoded(),
            video_frames_delivered: self.video_frames_delivered(),
            video_decode_failures: self.video_decode_failures(),
            audio_packets_queued: self.audio_packets_queued(),
            audio_packets_dropped: self.audio_packets_dropped(),
            audio_frames_decoded: self.audio_frames_decoded(),
            silence_fills: self.silence_fills(),
            audio_frames_truncated: self.audio_frames_truncated(),
        }
    }
}

impl Default for PlaybackHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub video_frames_decoded: u64,
    pub video_frames_delivered: u64,
    pub video_decode_failures: u64,
    pub audio_packets_queued: u64,
    pub audio_packets_dropped: u64,
    pub audio_frames_decoded: u64,
    pub silence_fills: u64,
    pub audio_frames_truncated: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "video {} decoded / {} delivered ({} failures), audio {} packets queued ({} dropped) / {} frames decoded ({} truncated), {} silence fills",
            self.video_frames_decoded,
            self.video_frames_delivered,
            self.video_decode_failures,
            self.audio_packets_queued,
            self.audio_packets_dropped,
            self.audio_frames_decoded,
            self.audio_frames_truncated,
            self.silence_fills
        )
    }
}

/// Health alert types
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlert {
    /// No video frame delivered for the threshold duration
    Stalled { duration: Duration },

    /// New video decode failures since the last check
    DecodeFailures { count: u64 },

    /// The audio callback synthesized silence since the last check
    AudioStarved { count: u64 },
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAlert::Stalled { duration } => {
                write!(f, "Video stalled for {:?}", duration)
            }
            HealthAlert::DecodeFailures { count } => {
                write!(f, "Video decode failures: {}", count)
            }
            HealthAlert::AudioStarved { count } => {
                write!(f, "Audio starved, {} silence fills", count)
            }
        }
    }
}

/// Health monitoring service
///
/// Periodically checks playback health and sends alerts when issues are detected.
pub struct HealthMonitor {
    health: Arc<PlaybackHealth>,
    alert_tx: mpsc::Sender<HealthAlert>,
    check_interval: Duration,
    stall_threshold: Duration,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(health: Arc<PlaybackHealth>, alert_tx: mpsc::Sender<HealthAlert>) -> Self {
        Self {
            health,
            alert_tx,
            check_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(5),
        }
    }

    /// Configure the check interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the stall threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Run the health monitor until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        let mut last_decode_failures = 0u64;
        let mut last_silence_fills = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            for alert in self.check(&mut last_decode_failures, &mut last_silence_fills) {
                if self.alert_tx.send(alert).await.is_err() {
                    return;
                }
            }
        }
    }

    fn check(&self, last_decode_failures: &mut u64, last_silence_fills: &mut u64) -> Vec<HealthAlert> {
        let mut alerts = Vec::new();

        if self.health.is_stalled(self.stall_threshold) {
            alerts.push(HealthAlert::Stalled {
                duration: self.stall_threshold,
            });
        }

        let decode_failures = self.health.video_decode_failures();
        if decode_failures > *last_decode_failures {
            alerts.push(HealthAlert::DecodeFailures {
                count: decode_failures - *last_decode_failures,
            });
            *last_decode_failures = decode_failures;
        }

        let silence_fills = self.health.silence_fills();
        if silence_fills > *last_silence_fills {
            alerts.push(HealthAlert::AudioStarved {
                count: silence_fills - *last_silence_fills,
            });
            *last_silence_fills = silence_fills;
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_metrics() {
        let health = PlaybackHealth::new();

        health.record_video_decoded();
        health.record_video_decoded();
        health.record_video_delivered();
        health.record_video_failure();
        health.record_audio_queued();
        health.record_audio_queued();
        health.record_audio_decoded();
        health.record_silence_fill();

        let summary = health.summary();
        assert_eq!(summary.video_frames_decoded, 2);
        assert_eq!(summary.video_frames_delivered, 1);
        assert_eq!(summary.video_decode_failures, 1);
        assert_eq!(summary.audio_packets_queued, 2);
        assert_eq!(summary.audio_packets_dropped, 0);
        assert_eq!(summary.audio_frames_decoded, 1);
        assert_eq!(summary.silence_fills, 1);
        assert_eq!(summary.audio_frames_truncated, 0);
    }

    #[test]
    fn test_stall_detection() {
        let health = PlaybackHealth::new();

        // Should not be stalled immediately
        assert!(!health.is_stalled(Duration::from_secs(1)));

        health.record_video_delivered();
        std::thread::sleep(Duration::from_millis(150));

        assert!(health.is_stalled(Duration::from_millis(100)));
    }

    #[test]
    fn test_alerts_report_deltas() {
        let health = Arc::new(PlaybackHealth::new());
        let (alert_tx, _alert_rx) = mpsc::channel(8);
        let monitor = HealthMonitor::new(health.clone(), alert_tx)
            .with_stall_threshold(Duration::from_secs(60));

        let mut failures = 0;
        let mut fills = 0;
        assert!(monitor.check(&mut failures, &mut fills).is_empty());

        health.record_video_failure();
        health.record_video_failure();
        health.record_silence_fill();
        let alerts = monitor.check(&mut failures, &mut fills);
        assert_eq!(
            alerts,
            vec![
                HealthAlert::DecodeFailures { count: 2 },
                HealthAlert::AudioStarved { count: 1 },
            ]
        );

        // nothing new since the previous check
        assert!(monitor.check(&mut failures, &mut fills).is_empty());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_cancel() {
        let health = Arc::new(PlaybackHealth::new());
        let (alert_tx, _alert_rx) = mpsc::channel(8);
        let monitor = HealthMonitor::new(health, alert_tx)
            .with_check_interval(Duration::from_millis(10));
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { monitor.run(task_cancel).await });
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
