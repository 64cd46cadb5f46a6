use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::assets::{
    AUDIO_BUFFER_FRAMES, DRAIN_TIMEOUT_MS, HEALTH_INTERVAL_SECS, PACING_TICK_MS,
    PRESENTER_POLL_MS, SILENCE_BYTES, STAGING_CAPACITY, STALL_THRESHOLD_SECS,
};

/// Tunables of a playback session
///
/// Every field is optional in the JSON file; missing ones keep their default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Period size requested from the audio device, in sample frames
    pub audio_buffer_frames: u32,
    /// Bytes of silence produced per refill once audio runs dry
    pub silence_bytes: usize,
    /// PCM staging buffer capacity in bytes
    pub staging_capacity: usize,
    pub pacing_tick_ms: u64,
    /// Upper bound on the wait for queued audio after the source ends
    pub drain_timeout_ms: u64,
    pub health_interval_secs: u64,
    pub stall_threshold_secs: u64,
    pub presenter_poll_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_buffer_frames: AUDIO_BUFFER_FRAMES,
            silence_bytes: SILENCE_BYTES,
            staging_capacity: STAGING_CAPACITY,
            pacing_tick_ms: PACING_TICK_MS,
            drain_timeout_ms: DRAIN_TIMEOUT_MS,
            health_interval_secs: HEALTH_INTERVAL_SECS,
            stall_threshold_secs: STALL_THRESHOLD_SECS,
            presenter_poll_ms: PRESENTER_POLL_MS,
        }
    }
}

impl PlayerConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn pacing_tick(&self) -> Duration {
        Duration::from_millis(self.pacing_tick_ms.max(1))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }

    pub fn presenter_poll(&self) -> Duration {
        Duration::from_millis(self.presenter_poll_ms.max(1))
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.audio_buffer_frames, 1024);
        assert_eq!(config.silence_bytes, 1024);
        assert_eq!(config.staging_capacity, 288_000);
        assert_eq!(config.pacing_tick(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json(r#"{ "audio_buffer_frames": 512, "drain_timeout_ms": 100 }"#)
            .unwrap();

        assert_eq!(config.audio_buffer_frames, 512);
        assert_eq!(config.drain_timeout(), Duration::from_millis(100));
        assert_eq!(config.silence_bytes, SILENCE_BYTES);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = PlayerConfig::from_json(r#"{ "pacing_tick_ms": 0, "presenter_poll_ms": 0 }"#)
            .unwrap();

        assert_eq!(config.pacing_tick(), Duration::from_millis(1));
        assert_eq!(config.presenter_poll(), Duration::from_millis(1));
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(PlayerConfig::from_json("{}").unwrap(), PlayerConfig::default());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(PlayerConfig::from_json("{ not json").is_err());
        assert!(PlayerConfig::load("/nonexistent/avplay.json").is_err());
    }
}
