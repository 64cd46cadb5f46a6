//! Headless presenter
//!
//! Stands in for a rendering layer: polls the latest-frame handoff and
//! accounts for what would have been shown.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::TripleBuffer;
use crate::decoder::VideoFrame;

/// What the presenter picked up over a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenterStats {
    /// Frames picked up from the handoff
    pub presented: u64,
    /// Frames replaced before they could be picked up
    pub overwritten: u64,
    /// Geometry of the last presented frame
    pub last_size: Option<(u32, u32)>,
}

impl std::fmt::Display for PresenterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames presented, {} overwritten",
            self.presented, self.overwritten
        )?;
        if let Some((w, h)) = self.last_size {
            write!(f, ", last {}x{}", w, h)?;
        }
        Ok(())
    }
}

pub struct Presenter {
    frames: Arc<TripleBuffer<VideoFrame>>,
    poll_interval: Duration,
}

impl Presenter {
    pub fn new(frames: Arc<TripleBuffer<VideoFrame>>, poll_interval: Duration) -> Self {
        Self {
            frames,
            poll_interval,
        }
    }

    /// Consume frames until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> PresenterStats {
        let mut stats = PresenterStats::default();
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.present(&mut stats),
            }
        }

        // pick up a frame committed right before shutdown
        self.present(&mut stats);
        stats.overwritten = self.frames.overwritten();
        info!("Presenter stopped: {}", stats);
        stats
    }

    fn present(&self, stats: &mut PresenterStats) {
        if !self.frames.has_new_frame() {
            return;
        }

        let frame = self.frames.read();
        let size = (frame.width, frame.height);
        if stats.last_size != Some(size) {
            debug!("Presenting {}x{} frames", size.0, size.1);
            stats.last_size = Some(size);
        }
        stats.presented += 1;
    }
}
