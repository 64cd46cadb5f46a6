// audio device
pub const AUDIO_BUFFER_FRAMES: u32 = 1024;
pub const OUTPUT_CHANNELS: u16 = 2;
pub const MAX_AUDIO_FRAME_SIZE: usize = 192_000;
pub const STAGING_CAPACITY: usize = MAX_AUDIO_FRAME_SIZE * 3 / 2;
pub const SILENCE_BYTES: usize = 1024;

// pcm layout: interleaved stereo s16
pub const BYTES_PER_SAMPLE_FRAME: usize = 4;
pub const PCM_SCALE: f32 = 32767.0;

// pacing
pub const DEFAULT_FRAME_RATE: f64 = 25.0;
pub const PACING_TICK_MS: u64 = 10;
pub const DRAIN_TIMEOUT_MS: u64 = 5_000;

// monitoring
pub const HEALTH_INTERVAL_SECS: u64 = 5;
pub const STALL_THRESHOLD_SECS: u64 = 5;
pub const PRESENTER_POLL_MS: u64 = 5;
