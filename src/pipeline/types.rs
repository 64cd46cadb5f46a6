//! Core types for the playback pipeline

use bytes::Bytes;
use std::time::Duration;

/// Presentation timestamp used for pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    /// Microseconds since playback start
    pub micros: i64,
}

impl Timestamp {
    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a timestamp from a presentation time in seconds
    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            micros: (secs * 1_000_000.0) as i64,
        }
    }

    /// Create a timestamp from a duration since playback start
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    /// Check if this timestamp lies after the given elapsed wall time
    pub fn is_ahead_of(&self, elapsed: Duration) -> bool {
        self.micros > elapsed.as_micros() as i64
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Kind of media carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
    /// Anything else the container carries (subtitles, data, attachments)
    Other,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
            MediaKind::Other => write!(f, "Other"),
        }
    }
}

/// Compressed packet read from the container
///
/// A packet belongs to exactly one stream. Timestamps are raw ticks in the
/// owning stream's time base; `None` means the container did not provide one.
#[derive(Clone)]
pub struct Packet {
    /// Index of the owning stream inside the container
    pub stream_index: usize,

    /// Compressed payload
    pub data: Bytes,

    /// Decode timestamp in stream time-base ticks
    pub dts: Option<i64>,

    /// Presentation timestamp in stream time-base ticks
    pub pts: Option<i64>,
}

impl Packet {
    /// Create a new packet without timestamps
    pub fn new(stream_index: usize, data: Bytes) -> Self {
        Self {
            stream_index,
            data,
            dts: None,
            pts: None,
        }
    }

    /// Attach a decode timestamp
    pub fn with_dts(mut self, dts: Option<i64>) -> Self {
        self.dts = dts;
        self
    }

    /// Attach a presentation timestamp
    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    /// Get the size of the payload in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index)
            .field("size", &self.size())
            .field("dts", &self.dts)
            .field("pts", &self.pts)
            .finish()
    }
}
