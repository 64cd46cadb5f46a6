//! Playback pipeline
//!
//! The dispatch loop reads the container and feeds two consumers:
//! - Video: decoded, timed by the video clock and paced against wall time
//!   on the dispatch thread, then handed to the presentation sink
//! - Audio: queued in the packet queue and pulled by the audio device thread
//!
//! The coordinator owns the session lifecycle, the health monitor and the
//! presenter task.

pub mod clock;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod queue;
pub mod session;
pub mod state;
pub mod sync;
pub mod types;

pub use clock::MediaClock;
pub use coordinator::PlaybackCoordinator;
pub use dispatch::{DispatchReport, Dispatcher, StreamLayout};
pub use error::PlaybackError;
pub use health::{HealthMonitor, PlaybackHealth};
pub use queue::{PacketQueue, QueueError};
pub use state::PipelineState;
pub use sync::VideoClock;
pub use types::{MediaKind, Packet, Timestamp};
