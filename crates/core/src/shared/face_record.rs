use serde::{Deserialize, Serialize};

use super::bounding_box::BoundingBox;

/// One detected face: the sampled frame it came from and its undilated box.
///
/// Persisted as `[face_id, {"frame_num": n, "bbox": {...}}]` pairs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub frame_num: usize,
    pub bbox: BoundingBox,
}

/// Per-video face identifier, assigned in time then in-frame order.
pub type FaceId = u64;
