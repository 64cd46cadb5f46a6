//! Playback coordinator
//!
//! Runs a session on a blocking thread and the presenter plus health
//! monitoring as async tasks next to it, and walks the state machine through
//! the session lifecycle.

use anyhow::{Result, anyhow};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatch::DispatchReport;
use super::error::PlaybackError;
use super::health::{HealthAlert, HealthMonitor, PlaybackHealth};
use super::session::PlaybackSession;
use super::state::PipelineState;
use crate::config::PlayerConfig;
use crate::decoder::VideoFrame;
use crate::display::{Presenter, TripleBuffer};

/// Coordinates one playback: Session (dispatch + audio) → Presenter
pub struct PlaybackCoordinator {
    config: PlayerConfig,
    health: Arc<PlaybackHealth>,
    state: PipelineState,
    frames: Arc<TripleBuffer<VideoFrame>>,
}

impl PlaybackCoordinator {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            health: Arc::new(PlaybackHealth::new()),
            state: PipelineState::Idle,
            frames: Arc::new(TripleBuffer::new(VideoFrame::default)),
        }
    }

    /// Get the current state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    fn transition(&mut self, target: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(&target) {
            return Err(PlaybackError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            }
            .into());
        }

        info!("PlaybackCoordinator: {} -> {}", self.state, target);
        self.state = target;
        Ok(())
    }

    /// Play `path` to the end
    pub async fn play(&mut self, path: String) -> Result<DispatchReport> {
        self.transition(PipelineState::Initializing)?;

        let stop = CancellationToken::new();

        let presenter = Presenter::new(self.frames.clone(), self.config.presenter_poll());
        let presenter_task = tokio::spawn(presenter.run(stop.clone()));

        let (alert_tx, mut alert_rx) = mpsc::channel::<HealthAlert>(16);
        let monitor = HealthMonitor::new(self.health.clone(), alert_tx)
            .with_check_interval(self.config.health_interval())
            .with_stall_threshold(self.config.stall_threshold());
        let monitor_stop = stop.clone();
        let monitor_task = tokio::spawn(async move { monitor.run(monitor_stop).await });

        let alert_task = tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                warn!("Playback health: {}", alert);
            }
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let config = self.config.clone();
        let frames = self.frames.clone();
        let health = self.health.clone();
        let playback = tokio::task::spawn_blocking(move || {
            let session = PlaybackSession::open(&path, &config, frames, health)?;
            let _ = ready_tx.send(());
            session.run()
        });

        // a dropped sender means setup failed
        if ready_rx.await.is_ok() {
            self.transition(PipelineState::Running {
                started_at: Instant::now(),
            })?;
        }

        let result = match playback.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("playback thread failed: {}", e)),
        };

        if let Some(duration) = self.state.running_duration() {
            info!("PlaybackCoordinator: played for {:.2?}", duration);
        }
        self.transition(PipelineState::Stopping)?;

        stop.cancel();
        join_task("Presenter", presenter_task).await;
        join_task("Health monitor", monitor_task).await;
        join_task("Health alert", alert_task).await;

        info!("Playback health: {}", self.health.summary());
        self.transition(PipelineState::Stopped)?;

        result
    }
}

/// Wait for a background task, logging it if it panicked or was cancelled
async fn join_task<T>(name: &str, task: JoinHandle<T>) -> Option<T> {
    match task.await {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{} task failed: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_failure_stops_without_running() {
        let mut coordinator = PlaybackCoordinator::new(PlayerConfig::default());

        let result = coordinator
            .play("/nonexistent/input.mkv".to_string())
            .await;

        assert!(result.is_err());
        assert_eq!(*coordinator.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn test_stopped_coordinator_cannot_replay() {
        let mut coordinator = PlaybackCoordinator::new(PlayerConfig::default());
        let _ = coordinator.play("/nonexistent/input.mkv".to_string()).await;

        let err = coordinator
            .play("/nonexistent/input.mkv".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlaybackError>(),
            Some(PlaybackError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_join_task_reports_panicked_task() {
        let finished = tokio::spawn(async { 7 });
        assert_eq!(join_task("finished", finished).await, Some(7));

        let panicked = tokio::spawn(async { panic!("monitor crashed") });
        assert_eq!(join_task::<()>("panicked", panicked).await, None);
    }
}
