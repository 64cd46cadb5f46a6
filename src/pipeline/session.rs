//! Playback session: everything opened for one file
//!
//! Owns the demuxer, both decoders, the packet queue and the audio output.
//! Created once at playback start on the thread that will run the dispatch
//! loop, torn down once when [`PlaybackSession::run`] returns.

use anyhow::Result;
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::dispatch::{DispatchReport, Dispatcher, StreamLayout};
use super::error::PlaybackError;
use super::health::PlaybackHealth;
use super::queue::PacketQueue;
use super::types::MediaKind;
use crate::config::PlayerConfig;
use crate::decoder::{
    AudioFeeder, AudioOutput, FfmpegSource, FfmpegVideoDecoder, RgbConverter, VideoFrame,
};
use crate::display::TripleBuffer;

type FfmpegDispatcher =
    Dispatcher<FfmpegSource, FfmpegVideoDecoder, RgbConverter, Arc<TripleBuffer<VideoFrame>>>;

pub struct PlaybackSession {
    dispatcher: FfmpegDispatcher,
    queue: Arc<PacketQueue>,
    // dropped after the dispatch loop so the device drains the closed queue
    _output: AudioOutput,
}

impl PlaybackSession {
    /// Open `path` and start the audio device
    ///
    /// Uses the first video and the first audio stream of the container. Any
    /// failure here aborts playback before it starts.
    pub fn open(
        path: &str,
        config: &PlayerConfig,
        frames: Arc<TripleBuffer<VideoFrame>>,
        health: Arc<PlaybackHealth>,
    ) -> Result<Self> {
        let source = FfmpegSource::open(path)?;

        let video = source
            .first_stream(MediaKind::Video)
            .cloned()
            .ok_or_else(|| PlaybackError::NoVideoStream(path.to_string()))?;
        let audio = source
            .first_stream(MediaKind::Audio)
            .cloned()
            .ok_or_else(|| PlaybackError::NoAudioStream(path.to_string()))?;

        if audio.channels == 0 {
            return Err(PlaybackError::UnsupportedChannels {
                channels: audio.channels as usize,
            }
            .into());
        }
        if audio.channels > 2 {
            log::warn!(
                "Audio stream has {} channels, playing the first two",
                audio.channels
            );
        }

        let video_decoder = source.video_decoder(video.index)?;
        let audio_decoder = source.audio_decoder(audio.index)?;

        let queue = Arc::new(PacketQueue::new());
        let fatal = CancellationToken::new();

        let feeder = AudioFeeder::new(
            queue.clone(),
            Box::new(audio_decoder),
            config.staging_capacity,
            config.silence_bytes,
            health.clone(),
            fatal.clone(),
        );
        let output = AudioOutput::open(audio.sample_rate, config.audio_buffer_frames, feeder)?;

        let layout = StreamLayout {
            video_index: video.index,
            audio_index: audio.index,
            video_time_base: video.time_base_secs,
            video_frame_period: video.frame_period_secs,
        };
        info!(
            "Playing video #{} ({}) with audio #{} ({})",
            video.index, video.codec, audio.index, audio.codec
        );

        let dispatcher = Dispatcher::new(
            source,
            video_decoder,
            RgbConverter::new(),
            frames,
            queue.clone(),
            layout,
            health,
            fatal,
        )
        .with_pacing_tick(config.pacing_tick())
        .with_drain_timeout(config.drain_timeout());

        Ok(Self {
            dispatcher,
            queue,
            _output: output,
        })
    }

    /// Run the dispatch loop to completion
    pub fn run(self) -> Result<DispatchReport> {
        let result = self.dispatcher.run();
        log::debug!("Tearing down session: {:?}", self.queue);
        result
    }
}
