//! Demux/dispatch loop
//!
//! Reads packets in container order and routes them: video packets are
//! decoded, timed and delivered on this thread, audio packets are handed to
//! the packet queue for the audio device thread, anything else is dropped.
//! Reading is gated so the loop never runs ahead of the last presentation
//! timestamp.

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::clock::MediaClock;
use super::error::PlaybackError;
use super::health::PlaybackHealth;
use super::queue::PacketQueue;
use super::sync::VideoClock;
use super::types::{MediaKind, Packet, Timestamp};
use crate::assets::{DRAIN_TIMEOUT_MS, PACING_TICK_MS};
use crate::decoder::{MediaSource, Picture, PixelConvert, VideoDecode};
use crate::display::FrameSink;

/// Which container streams are played
#[derive(Debug, Clone, Copy)]
pub struct StreamLayout {
    pub video_index: usize,
    pub audio_index: usize,
    /// Seconds per tick of the video stream time base
    pub video_time_base: f64,
    /// Nominal display duration of one video frame, in seconds
    pub video_frame_period: f64,
}

impl StreamLayout {
    pub fn kind_of(&self, packet: &Packet) -> MediaKind {
        match packet.stream_index {
            i if i == self.video_index => MediaKind::Video,
            i if i == self.audio_index => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }
}

/// Outcome of a completed dispatch run
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub packets_read: u64,
    pub video_packets: u64,
    pub audio_packets: u64,
    pub other_packets: u64,
    /// Presentation time of the last synchronized picture
    pub last_pts: Timestamp,
    /// Whether the audio side consumed every queued packet before returning
    pub drained: bool,
    pub elapsed: Duration,
}

impl std::fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} packets ({} video, {} audio, {} other) in {:.2?}, last pts {}",
            self.packets_read,
            self.video_packets,
            self.audio_packets,
            self.other_packets,
            self.elapsed,
            self.last_pts
        )
    }
}

pub struct Dispatcher<Src, Dec, Conv, Sink> {
    source: Src,
    video: Dec,
    converter: Conv,
    sink: Sink,
    queue: Arc<PacketQueue>,
    layout: StreamLayout,
    video_clock: VideoClock,
    last_pts: Timestamp,
    health: Arc<PlaybackHealth>,
    /// Cancelled by the audio side on a fatal decode error
    fatal: CancellationToken,
    pacing_tick: Duration,
    drain_timeout: Duration,
}

impl<Src, Dec, Conv, Sink> Dispatcher<Src, Dec, Conv, Sink>
where
    Src: MediaSource,
    Dec: VideoDecode,
    Conv: PixelConvert<Dec::Frame>,
    Sink: FrameSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Src,
        video: Dec,
        converter: Conv,
        sink: Sink,
        queue: Arc<PacketQueue>,
        layout: StreamLayout,
        health: Arc<PlaybackHealth>,
        fatal: CancellationToken,
    ) -> Self {
        Self {
            source,
            video,
            converter,
            sink,
            queue,
            video_clock: VideoClock::new(layout.video_frame_period),
            layout,
            last_pts: Timestamp::default(),
            health,
            fatal,
            pacing_tick: Duration::from_millis(PACING_TICK_MS),
            drain_timeout: Duration::from_millis(DRAIN_TIMEOUT_MS),
        }
    }

    pub fn with_pacing_tick(mut self, tick: Duration) -> Self {
        self.pacing_tick = tick;
        self
    }

    /// Bound the wait for the audio side after the source is exhausted
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Run until the source is exhausted or audio decoding fails
    ///
    /// The packet queue is closed on every exit path so the audio thread
    /// never stays blocked on it.
    pub fn run(mut self) -> Result<DispatchReport> {
        let clock = MediaClock::new();
        let mut report = DispatchReport::default();
        info!("Dispatch loop started");

        loop {
            if self.fatal.is_cancelled() {
                break;
            }

            let packet = match self.source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    debug!("End of source after {} packets", report.packets_read);
                    break;
                }
                Err(e) => {
                    warn!("Read error, treating as end of stream: {:#}", e);
                    break;
                }
            };
            report.packets_read += 1;

            clock.pace(self.last_pts, self.pacing_tick, &self.fatal);

            match self.layout.kind_of(&packet) {
                MediaKind::Video => {
                    report.video_packets += 1;
                    self.dispatch_video(&packet);
                }
                MediaKind::Audio => {
                    report.audio_packets += 1;
                    self.dispatch_audio(packet);
                }
                MediaKind::Other => report.other_packets += 1,
            }
        }

        if !self.fatal.is_cancelled() {
            self.flush_video();
        }

        self.queue.close();
        report.drained = self.wait_for_drain();
        report.last_pts = self.last_pts;
        report.elapsed = clock.elapsed();

        if self.fatal.is_cancelled() {
            return Err(PlaybackError::AudioDecode.into());
        }

        info!("Dispatch loop finished: {}", report);
        Ok(report)
    }

    fn dispatch_video(&mut self, packet: &Packet) {
        if let Err(e) = self.video.push(packet) {
            warn!("Video decode error: {:#}", e);
            self.health.record_video_failure();
            return;
        }

        self.drain_pictures(packet.dts);
    }

    /// Deliver the pictures the decoder still holds back for reordering
    fn flush_video(&mut self) {
        if let Err(e) = self.video.flush() {
            warn!("Video decoder flush failed: {:#}", e);
            self.health.record_video_failure();
            return;
        }

        self.drain_pictures(None);
    }

    /// Take, time, convert and deliver every picture the decoder has ready
    ///
    /// `dts` is the decode timestamp of the packet just pushed, used for
    /// pictures that carry no timestamp of their own.
    fn drain_pictures(&mut self, dts: Option<i64>) {
        loop {
            let frame = match self.video.take() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("Video decode error: {:#}", e);
                    self.health.record_video_failure();
                    break;
                }
            };
            self.health.record_video_decoded();

            let ticks = frame.timestamp().or(dts).unwrap_or(0);
            let pts = self
                .video_clock
                .synchronize(&frame, ticks as f64 * self.layout.video_time_base);
            self.last_pts = Timestamp::from_secs_f64(pts);

            match self.converter.convert(&frame) {
                Ok(rgb) => {
                    self.sink.deliver(rgb);
                    self.health.record_video_delivered();
                }
                Err(e) => {
                    warn!("Pixel conversion failed: {:#}", e);
                    self.health.record_video_failure();
                }
            }
        }
    }

    fn dispatch_audio(&mut self, packet: Packet) {
        match self.queue.put(packet) {
            Ok(()) => self.health.record_audio_queued(),
            Err(e) => {
                warn!("Dropping audio packet: {}", e);
                self.health.record_audio_dropped();
            }
        }
    }

    /// Wait for the audio side to take every queued packet
    fn wait_for_drain(&self) -> bool {
        let deadline = Instant::now() + self.drain_timeout;

        while !self.queue.is_empty() {
            if self.fatal.is_cancelled() || Instant::now() >= deadline {
                warn!(
                    "Audio not drained, {} packets ({} bytes) left",
                    self.queue.len(),
                    self.queue.size()
                );
                return false;
            }
            std::thread::sleep(self.pacing_tick);
        }

        true
    }
}
