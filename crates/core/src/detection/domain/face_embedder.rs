use crate::shared::frame::Frame;
use crate::shared::SendError;

/// Domain interface for face embedding.
pub trait FaceEmbedder: Send + Sync {
    /// Returns one fixed-length vector per crop, in input order.
    fn embed(&self, crops: &[Frame]) -> Result<Vec<Vec<f32>>, SendError>;
}
