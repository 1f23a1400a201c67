use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::shared::SendError;

/// Random-access frame decoding from a single video file.
///
/// A source is a single-owner handle: each detection worker opens its own,
/// so implementations never need internal locking.
pub trait FrameSource: Send {
    /// Opens the video and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SendError>;

    /// Seeks to `frame_number` and decodes that one frame as RGB.
    fn read_frame(&mut self, frame_number: usize) -> Result<Frame, SendError>;

    /// Releases decoder resources. Safe to call more than once.
    fn close(&mut self);
}

/// Creates a fresh, unopened source for each worker.
pub type FrameSourceFactory = dyn Fn() -> Box<dyn FrameSource> + Send + Sync;
