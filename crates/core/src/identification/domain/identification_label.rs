use serde::{Deserialize, Serialize};

use crate::shared::face_record::FaceId;

/// A confident identity for one face. Persisted as `[face_id, name, confidence]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(FaceId, String, f64)", into = "(FaceId, String, f64)")]
pub struct IdentificationLabel {
    pub face_id: FaceId,
    pub name: String,
    pub confidence: f64,
}

impl From<(FaceId, String, f64)> for IdentificationLabel {
    fn from((face_id, name, confidence): (FaceId, String, f64)) -> Self {
        Self {
            face_id,
            name,
            confidence,
        }
    }
}

impl From<IdentificationLabel> for (FaceId, String, f64) {
    fn from(label: IdentificationLabel) -> Self {
        (label.face_id, label.name, label.confidence)
    }
}
