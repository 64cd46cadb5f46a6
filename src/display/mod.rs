//! Presentation side: frame handoff, headless presenter and audio staging

pub mod audio_buffer;
pub mod presenter;
pub mod video_buffer;

use crate::decoder::VideoFrame;

/// Receives finished video frames from the dispatch loop
///
/// Delivery is fire-and-forget: the sink must not block the caller and
/// gives no acknowledgement.
pub trait FrameSink {
    fn deliver(&self, frame: VideoFrame);
}

pub use presenter::{Presenter, PresenterStats};
pub use video_buffer::TripleBuffer;

impl<S: FrameSink + ?Sized> FrameSink for std::sync::Arc<S> {
    fn deliver(&self, frame: VideoFrame) {
        (**self).deliver(frame)
    }
}
