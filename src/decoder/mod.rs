//! Demuxing, decoding and audio output
//!
//! The playback core only talks to the traits defined here; `ffmpeg` provides
//! the implementations backed by FFmpeg and `audio` the cpal device plus the
//! pull callback feeding it.

mod ffmpeg;

pub mod audio;
pub mod convert;

use crate::pipeline::types::Packet;
use anyhow::Result;

/// Decoded video frame converted to packed 32-bit RGB pixels.
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decoded audio frame with planar f32 samples, one plane per channel.
#[derive(Debug, Clone, Default)]
pub struct AudioFrame {
    pub planes: Vec<Vec<f32>>,
    pub samples: usize,
}

impl AudioFrame {
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.len(),
            planes: vec![samples],
        }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>) -> Self {
        Self {
            samples: left.len().min(right.len()),
            planes: vec![left, right],
        }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }
}

/// Source of compressed packets, read in container order.
pub trait MediaSource {
    /// Next packet, or `None` once the source is exhausted.
    fn read_packet(&mut self) -> Result<Option<Packet>>;
}

/// A decoded picture as seen by the sync policy.
pub trait Picture {
    /// Timestamp attached by the decoder, in stream time-base ticks.
    fn timestamp(&self) -> Option<i64>;

    /// Number of extra half-frame periods this picture should be displayed for.
    fn repeat_pict(&self) -> u32;
}

/// Video decoder: accepts packets, yields zero or more pictures per packet.
pub trait VideoDecode {
    type Frame: Picture;

    fn push(&mut self, packet: &Packet) -> Result<()>;

    /// Next decoded picture, `None` when the decoder needs more input.
    fn take(&mut self) -> Result<Option<Self::Frame>>;

    /// Signal end of input so pictures still held for reordering come out of
    /// `take`.
    fn flush(&mut self) -> Result<()>;
}

/// Audio decoder driven from the audio device thread.
pub trait AudioDecode: Send {
    fn push(&mut self, packet: &Packet) -> Result<()>;

    /// Next decoded frame, `None` when the decoder needs more input.
    fn take(&mut self) -> Result<Option<AudioFrame>>;

    fn flush(&mut self) -> Result<()>;
}

/// Pixel format conversion to the fixed RGB output format.
pub trait PixelConvert<F> {
    fn convert(&mut self, frame: &F) -> Result<VideoFrame>;
}

pub use audio::{AudioFeeder, AudioOutput};
pub use ffmpeg::{FfmpegAudioDecoder, FfmpegSource, FfmpegVideoDecoder, RgbConverter, StreamInfo};
