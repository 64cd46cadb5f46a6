use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, StreamConfig};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::convert::interleave_s16;
use super::{AudioDecode, AudioFrame};
use crate::assets::{BYTES_PER_SAMPLE_FRAME, OUTPUT_CHANNELS};
use crate::display::audio_buffer::StagingBuffer;
use crate::pipeline::error::PlaybackError;
use crate::pipeline::health::PlaybackHealth;
use crate::pipeline::queue::PacketQueue;

const I16_TO_F32: f32 = 1.0 / 32768.0;

/// Pull side of the audio path
///
/// Owns the audio decoder and the PCM staging buffer. The device thread calls
/// [`AudioFeeder::fill`] whenever it needs more bytes; the feeder decodes
/// packets from the shared queue on demand and never hands back a short
/// buffer. Once the queue is closed and drained it produces silence.
pub struct AudioFeeder {
    queue: Arc<PacketQueue>,
    decoder: Box<dyn AudioDecode>,
    staging: StagingBuffer,
    silence_bytes: usize,
    health: Arc<PlaybackHealth>,
    /// Cancelled when decoding fails, stops the dispatch loop
    fatal: CancellationToken,
    failed: bool,
    /// Set once the decoder was told the input ended
    flushed: bool,
    scratch: Vec<u8>,
}

impl AudioFeeder {
    pub fn new(
        queue: Arc<PacketQueue>,
        decoder: Box<dyn AudioDecode>,
        staging_capacity: usize,
        silence_bytes: usize,
        health: Arc<PlaybackHealth>,
        fatal: CancellationToken,
    ) -> Self {
        let staging = StagingBuffer::new(staging_capacity.max(BYTES_PER_SAMPLE_FRAME));
        // silence must make progress and stay frame aligned
        let silence_bytes = (silence_bytes / BYTES_PER_SAMPLE_FRAME * BYTES_PER_SAMPLE_FRAME)
            .clamp(BYTES_PER_SAMPLE_FRAME, staging.capacity());

        Self {
            queue,
            decoder,
            staging,
            silence_bytes,
            health,
            fatal,
            failed: false,
            flushed: false,
            scratch: Vec::new(),
        }
    }

    /// Write exactly `out.len()` bytes of interleaved stereo s16 PCM
    pub fn fill(&mut self, out: &mut [u8]) {
        let mut written = 0;
        while written < out.len() {
            if self.staging.is_exhausted() {
                self.refill();
            }
            written += self.staging.read_into(&mut out[written..]);
        }
    }

    /// Fill a device buffer of interleaved i16 samples
    pub fn fill_samples_i16(&mut self, out: &mut [i16]) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(out.len() * 2, 0);
        self.fill(&mut scratch);

        for (sample, bytes) in out.iter_mut().zip(scratch.chunks_exact(2)) {
            *sample = i16::from_ne_bytes([bytes[0], bytes[1]]);
        }
        self.scratch = scratch;
    }

    /// Fill a device buffer of interleaved f32 samples
    pub fn fill_samples_f32(&mut self, out: &mut [f32]) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(out.len() * 2, 0);
        self.fill(&mut scratch);

        for (sample, bytes) in out.iter_mut().zip(scratch.chunks_exact(2)) {
            *sample = i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 * I16_TO_F32;
        }
        self.scratch = scratch;
    }

    /// Check whether the decoder has failed
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    fn refill(&mut self) {
        if !self.failed {
            match self.decode_frame() {
                Ok(Some(frame)) => {
                    let produced = self.staging.refill_with(|out| interleave_s16(&frame, out));
                    let expected = frame.samples * BYTES_PER_SAMPLE_FRAME;
                    if produced < expected {
                        log::warn!(
                            "Audio frame of {} samples truncated to {} of {} bytes",
                            frame.samples,
                            produced,
                            expected
                        );
                        self.health.record_audio_truncated();
                    }
                    if produced > 0 {
                        self.health.record_audio_decoded();
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Audio decode failed: {:#}", e);
                    self.failed = true;
                    self.fatal.cancel();
                }
            }
        }

        self.health.record_silence_fill();
        self.staging.fill_silence(self.silence_bytes);
    }

    /// Decode the next non-empty frame
    ///
    /// Frames left over from the previous packet are consumed before another
    /// packet is dequeued. Once the queue is closed and empty the decoder is
    /// flushed a single time; after its last frames `None` is returned.
    fn decode_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            while let Some(frame) = self.decoder.take()? {
                if frame.samples > 0 {
                    return Ok(Some(frame));
                }
            }

            match self.queue.get(true) {
                Some(packet) => self.decoder.push(&packet)?,
                None if !self.flushed => {
                    self.flushed = true;
                    self.decoder.flush()?;
                }
                None => return Ok(None),
            }
        }
    }
}

/// Open audio output stream, kept alive for the duration of playback
pub struct AudioOutput {
    _stream: cpal::Stream,
}

impl AudioOutput {
    /// Open the default output device and start pulling from `feeder`
    ///
    /// The stream is opened at `sample_rate` with two channels. If the device
    /// refuses `buffer_frames` as a fixed period size it is reopened with the
    /// device default.
    pub fn open(sample_rate: u32, buffer_frames: u32, feeder: AudioFeeder) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoOutputDevice)?;

        let sample_format = match device.default_output_config() {
            Ok(config) => config.sample_format(),
            Err(e) => {
                log::warn!("Could not query output config ({}), assuming i16", e);
                SampleFormat::I16
            }
        };
        check_sample_format(sample_format)?;

        let feeder = Arc::new(Mutex::new(feeder));
        let mut config = StreamConfig {
            channels: OUTPUT_CHANNELS,
            sample_rate,
            buffer_size: BufferSize::Fixed(buffer_frames),
        };

        let stream = match build_stream(&device, &config, sample_format, &feeder) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!(
                    "Output device rejected {} frame buffer ({}), using device default",
                    buffer_frames,
                    e
                );
                config.buffer_size = BufferSize::Default;
                build_stream(&device, &config, sample_format, &feeder)?
            }
        };
        stream.play()?;

        log::info!(
            "Audio output opened: {} Hz, {} channels, {:?} samples",
            sample_rate,
            OUTPUT_CHANNELS,
            sample_format
        );

        Ok(Self { _stream: stream })
    }
}

/// Only i16 and f32 device buffers are filled
fn check_sample_format(format: SampleFormat) -> Result<()> {
    match format {
        SampleFormat::I16 | SampleFormat::F32 => Ok(()),
        other => Err(PlaybackError::UnsupportedOutputFormat(format!("{:?}", other)).into()),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    feeder: &Arc<Mutex<AudioFeeder>>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let feeder = Arc::clone(feeder);
    let err_fn = |err: cpal::StreamError| log::error!("Audio output error: {}", err);

    match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |output: &mut [f32], _| {
                if let Ok(mut feeder) = feeder.lock() {
                    feeder.fill_samples_f32(output);
                } else {
                    output.fill(0.0);
                }
            },
            err_fn,
            None,
        ),
        _ => device.build_output_stream(
            config,
            move |output: &mut [i16], _| {
                if let Ok(mut feeder) = feeder.lock() {
                    feeder.fill_samples_i16(output);
                } else {
                    output.fill(0);
                }
            },
            err_fn,
            None,
        ),
    }
}
