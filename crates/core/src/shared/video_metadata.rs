use serde::{Deserialize, Serialize};

/// Properties of a source video, read once when the video is opened.
///
/// Serialized as the per-video `metadata.json` artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub name: String,
    pub fps: f64,
    #[serde(rename = "frames")]
    pub total_frames: usize,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// Duration in seconds derived from frame count and frame rate.
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}
