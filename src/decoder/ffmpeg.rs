use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::audio::{AudioDecoder, AudioFrame as FfAudioFrame};
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::scaler::{Algorithm, VideoFrameScaler};
use ac_ffmpeg::codec::video::{PixelFormat, VideoDecoder, VideoFrame as FfVideoFrame};
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::fs::File;

use super::{AudioDecode, AudioFrame, MediaSource, Picture, PixelConvert, VideoDecode, VideoFrame};
use crate::assets::DEFAULT_FRAME_RATE;
use crate::pipeline::error::PlaybackError;
use crate::pipeline::types::{MediaKind, Packet};

const I16_TO_F32: f32 = 1.0 / 32768.0;

/// Target pixel layout handed to the presentation sink
const RGB_FORMAT: &str = "bgra";
const RGB_BYTES_PER_PIXEL: usize = 4;

/// Description of one container stream, logged at startup
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    /// Seconds per tick of the stream time base
    pub time_base_secs: f64,
    /// Nominal display duration of one video frame, in seconds
    pub frame_period_secs: f64,
    pub width: usize,
    pub height: usize,
    pub sample_rate: u32,
    pub channels: u32,
}

impl std::fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MediaKind::Video => write!(
                f,
                "#{} video {} {}x{}, time base {}s, {:.3} fps",
                self.index,
                self.codec,
                self.width,
                self.height,
                self.time_base_secs,
                1.0 / self.frame_period_secs
            ),
            MediaKind::Audio => write!(
                f,
                "#{} audio {} {} Hz {} ch, time base {}s",
                self.index, self.codec, self.sample_rate, self.channels, self.time_base_secs
            ),
            MediaKind::Other => write!(f, "#{} other {}", self.index, self.codec),
        }
    }
}

fn seconds_per_tick(time_base: TimeBase) -> f64 {
    Timestamp::new(1, time_base).as_f64().unwrap_or_default()
}

/// Average frame period from the stream duration and frame count
///
/// Falls back to the default frame rate when the container does not report
/// both or the result is not a plausible frame period.
fn frame_period(duration_secs: Option<f64>, frames: Option<u64>) -> f64 {
    let fallback = 1.0 / DEFAULT_FRAME_RATE;
    match (duration_secs, frames) {
        (Some(duration), Some(frames)) if frames > 0 => {
            let period = duration / frames as f64;
            if period.is_finite() && (0.001..=1.0).contains(&period) {
                period
            } else {
                fallback
            }
        }
        _ => fallback,
    }
}

fn to_timestamp(ticks: Option<i64>, time_base: TimeBase) -> Timestamp {
    match ticks {
        Some(ticks) => Timestamp::new(ticks, time_base),
        None => Timestamp::null(),
    }
}

fn from_timestamp(ts: Timestamp) -> Option<i64> {
    if ts.is_null() {
        None
    } else {
        Some(ts.timestamp())
    }
}

fn to_ffmpeg_packet(packet: &Packet, time_base: TimeBase) -> ac_ffmpeg::packet::Packet {
    PacketMut::from(&packet.data[..])
        .with_pts(to_timestamp(packet.pts, time_base))
        .with_dts(to_timestamp(packet.dts, time_base))
        .freeze()
}

/// Container demuxer reading a local file
pub struct FfmpegSource {
    demuxer: DemuxerWithStreamInfo<File>,
    streams: Vec<StreamInfo>,
}

impl FfmpegSource {
    /// Open `path` and probe its streams
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open {}", path))?;
        let io = IO::from_seekable_read_stream(file);

        let demuxer = Demuxer::builder()
            .build(io)
            .with_context(|| format!("unrecognized container: {}", path))?
            .find_stream_info(None)
            .map_err(|(_, e)| e)
            .with_context(|| format!("no stream information in {}", path))?;

        let streams = demuxer
            .streams()
            .iter()
            .enumerate()
            .map(|(index, stream)| {
                let params = stream.codec_parameters();
                let mut info = StreamInfo {
                    index,
                    kind: MediaKind::Other,
                    codec: params.decoder_name().unwrap_or("unknown").to_string(),
                    time_base_secs: seconds_per_tick(stream.time_base()),
                    frame_period_secs: 1.0 / DEFAULT_FRAME_RATE,
                    width: 0,
                    height: 0,
                    sample_rate: 0,
                    channels: 0,
                };
                if let Some(video) = params.as_video_codec_parameters() {
                    info.kind = MediaKind::Video;
                    let duration = stream.duration();
                    info.frame_period_secs = frame_period(
                        duration.as_f64(),
                        stream.frames(),
                    );
                    info.width = video.width();
                    info.height = video.height();
                } else if let Some(audio) = params.as_audio_codec_parameters() {
                    info.kind = MediaKind::Audio;
                    info.sample_rate = audio.sample_rate();
                    info.channels = audio.channel_layout().channels();
                }
                info
            })
            .collect::<Vec<_>>();

        log::info!("Opened {} ({} streams)", path, streams.len());
        for info in &streams {
            log::info!("  {}", info);
        }

        Ok(Self { demuxer, streams })
    }

    /// First stream of the given kind
    pub fn first_stream(&self, kind: MediaKind) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == kind)
    }

    /// Open a decoder for the video stream at `index`
    pub fn video_decoder(&self, index: usize) -> Result<FfmpegVideoDecoder> {
        let stream = &self.demuxer.streams()[index];
        let decoder = VideoDecoder::from_stream(stream)?
            .build()
            .with_context(|| format!("no usable decoder for video stream #{}", index))?;

        Ok(FfmpegVideoDecoder {
            decoder,
            time_base: stream.time_base(),
        })
    }

    /// Open a decoder for the audio stream at `index`
    pub fn audio_decoder(&self, index: usize) -> Result<FfmpegAudioDecoder> {
        let stream = &self.demuxer.streams()[index];
        let decoder = AudioDecoder::from_stream(stream)?
            .build()
            .with_context(|| format!("no usable decoder for audio stream #{}", index))?;

        Ok(FfmpegAudioDecoder {
            decoder,
            time_base: stream.time_base(),
        })
    }
}

impl MediaSource for FfmpegSource {
    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let Some(packet) = self.demuxer.take()? else {
            return Ok(None);
        };

        Ok(Some(
            Packet::new(packet.stream_index(), Bytes::copy_from_slice(packet.data()))
                .with_dts(from_timestamp(packet.dts()))
                .with_pts(from_timestamp(packet.pts())),
        ))
    }
}

/// Video decoder for one container stream
pub struct FfmpegVideoDecoder {
    decoder: VideoDecoder,
    time_base: TimeBase,
}

impl VideoDecode for FfmpegVideoDecoder {
    type Frame = FfVideoFrame;

    fn push(&mut self, packet: &Packet) -> Result<()> {
        self.decoder.push(to_ffmpeg_packet(packet, self.time_base))?;
        Ok(())
    }

    fn take(&mut self) -> Result<Option<FfVideoFrame>> {
        Ok(self.decoder.take()?)
    }

    fn flush(&mut self) -> Result<()> {
        self.decoder.flush()?;
        Ok(())
    }
}

impl Picture for FfVideoFrame {
    fn timestamp(&self) -> Option<i64> {
        from_timestamp(self.pts())
    }

    // not exposed by the bindings
    fn repeat_pict(&self) -> u32 {
        0
    }
}

/// Converts decoded pictures to packed BGRA
///
/// The scaler is rebuilt whenever the source geometry or pixel format changes.
pub struct RgbConverter {
    scaler: Option<(VideoFrameScaler, (PixelFormat, usize, usize))>,
    target: PixelFormat,
}

impl RgbConverter {
    pub fn new() -> Self {
        Self {
            scaler: None,
            target: get_pixel_format(RGB_FORMAT),
        }
    }

    fn scaler_for(&mut self, frame: &FfVideoFrame) -> Result<&mut VideoFrameScaler> {
        let key = (frame.pixel_format(), frame.width(), frame.height());

        let reusable = matches!(&self.scaler, Some((_, current)) if *current == key);
        if !reusable {
            let scaler = VideoFrameScaler::builder()
                .source_pixel_format(key.0)
                .source_width(key.1)
                .source_height(key.2)
                .target_pixel_format(self.target)
                .target_width(key.1)
                .target_height(key.2)
                .algorithm(Algorithm::Bicubic)
                .build()?;
            log::debug!("Scaler configured for {}x{}", key.1, key.2);
            self.scaler = Some((scaler, key));
        }
        let (scaler, _) = self.scaler.as_mut().expect("scaler configured above");
        Ok(scaler)
    }
}

impl Default for RgbConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelConvert<FfVideoFrame> for RgbConverter {
    fn convert(&mut self, frame: &FfVideoFrame) -> Result<VideoFrame> {
        let (width, height) = (frame.width(), frame.height());
        let scaled = self.scaler_for(frame)?.scale(frame)?;

        let planes = scaled.planes();
        let plane = &planes[0];
        let row = width * RGB_BYTES_PER_PIXEL;
        let mut data = vec![0u8; row * height];
        extract_plane(&mut data, plane.data(), plane.line_size(), row, height);

        Ok(VideoFrame {
            data,
            width: width as u32,
            height: height as u32,
        })
    }
}

/// Copy `height` rows of `width` bytes out of a padded plane
#[inline]
fn extract_plane(dst: &mut [u8], src: &[u8], stride: usize, width: usize, height: usize) {
    if stride == width && src.len() >= width * height {
        dst.copy_from_slice(&src[..width * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * stride;
        let dst_start = r * width;
        if src_start + width > src.len() || dst_start + width > dst.len() {
            break;
        }
        dst[dst_start..dst_start + width].copy_from_slice(&src[src_start..src_start + width]);
    }
}

/// Audio decoder for one container stream, output as planar f32
pub struct FfmpegAudioDecoder {
    decoder: AudioDecoder,
    time_base: TimeBase,
}

// only ever used from the audio device thread after construction
unsafe impl Send for FfmpegAudioDecoder {}

impl AudioDecode for FfmpegAudioDecoder {
    fn push(&mut self, packet: &Packet) -> Result<()> {
        self.decoder.push(to_ffmpeg_packet(packet, self.time_base))?;
        Ok(())
    }

    fn take(&mut self) -> Result<Option<AudioFrame>> {
        match self.decoder.take()? {
            Some(frame) => Ok(Some(to_planar_f32(&frame)?)),
            None => Ok(None),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.decoder.flush()?;
        Ok(())
    }
}

/// Convert decoder output to at most two planes of f32
fn to_planar_f32(frame: &FfAudioFrame) -> Result<AudioFrame> {
    let channels = frame.channel_layout().channels() as usize;
    if channels == 0 {
        return Err(PlaybackError::UnsupportedChannels { channels }.into());
    }

    let samples = frame.samples();
    let keep = channels.min(2);
    let planes = frame.planes();
    let format = frame.sample_format().name();

    let out = match format {
        "fltp" => (0..keep)
            .map(|c| read_f32(planes[c].data(), 0, 1, samples))
            .collect::<Result<Vec<_>>>()?,
        "flt" => (0..keep)
            .map(|c| read_f32(planes[0].data(), c, channels, samples))
            .collect::<Result<Vec<_>>>()?,
        "s16p" => (0..keep)
            .map(|c| read_s16(planes[c].data(), 0, 1, samples))
            .collect::<Result<Vec<_>>>()?,
        "s16" => (0..keep)
            .map(|c| read_s16(planes[0].data(), c, channels, samples))
            .collect::<Result<Vec<_>>>()?,
        other => return Err(PlaybackError::UnsupportedSampleFormat(other.to_string()).into()),
    };

    Ok(AudioFrame {
        planes: out,
        samples,
    })
}

fn read_f32(data: &[u8], offset: usize, step: usize, samples: usize) -> Result<Vec<f32>> {
    let needed = (samples * step) * 4;
    anyhow::ensure!(
        data.len() >= needed,
        "audio plane too small ({} bytes for {} samples)",
        data.len(),
        samples
    );

    Ok(data[..needed]
        .chunks_exact(4)
        .skip(offset)
        .step_by(step)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn read_s16(data: &[u8], offset: usize, step: usize, samples: usize) -> Result<Vec<f32>> {
    let needed = (samples * step) * 2;
    anyhow::ensure!(
        data.len() >= needed,
        "audio plane too small ({} bytes for {} samples)",
        data.len(),
        samples
    );

    Ok(data[..needed]
        .chunks_exact(2)
        .skip(offset)
        .step_by(step)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]) as f32 * I16_TO_F32)
        .collect())
}
