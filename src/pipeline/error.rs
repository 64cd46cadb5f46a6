//! Playback error types

use thiserror::Error;

/// Failures that end a playback session
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no video stream in {0}")]
    NoVideoStream(String),

    #[error("no audio stream in {0}")]
    NoAudioStream(String),

    #[error("unsupported audio layout: {channels} channels")]
    UnsupportedChannels { channels: usize },

    #[error("unsupported audio sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("audio decoding failed, playback aborted")]
    AudioDecode,

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("unsupported output device sample format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}
