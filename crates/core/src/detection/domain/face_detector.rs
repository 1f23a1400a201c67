use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::SendError;

/// Domain interface for batched face detection.
///
/// Detectors are shared by reference across detection workers, hence
/// `&self` and `Sync`.
pub trait FaceDetector: Send + Sync {
    /// Returns one list of normalized boxes per input frame.
    ///
    /// The outer list follows input order and each inner list keeps the
    /// detector's own per-frame order. A frame without faces yields an
    /// empty list.
    fn detect(&self, frames: &[Frame]) -> Result<Vec<Vec<BoundingBox>>, SendError>;
}
