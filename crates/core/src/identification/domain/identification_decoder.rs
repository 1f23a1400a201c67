use std::collections::BTreeMap;

use crate::identification::domain::identification_label::IdentificationLabel;
use crate::identification::domain::montage::MontageGeometry;
use crate::identification::domain::recognition_service::{RecognitionResponse, ServiceBox};
use crate::shared::face_record::FaceId;

#[derive(Clone, Debug)]
struct Candidate {
    name: String,
    confidence: f64,
    l1: f64,
}

/// Where a service box lands on the montage grid.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CellHit {
    gx: i64,
    gy: i64,
    residual_x: f64,
    residual_y: f64,
}

impl CellHit {
    fn locate(bbox: &ServiceBox, geometry: &MontageGeometry) -> Self {
        let block = geometry.block_size as f64;
        let half = (geometry.block_size / 2) as f64;
        let (cx, cy) = bbox.pixel_center(geometry.width() as f64, geometry.height() as f64);
        Self {
            gx: (cx / block).floor() as i64,
            gy: (cy / block).floor() as i64,
            residual_x: (cx.rem_euclid(block) - half).abs(),
            residual_y: (cy.rem_euclid(block) - half).abs(),
        }
    }

    fn within(&self, band: f64) -> bool {
        self.residual_x < band && self.residual_y < band
    }

    fn l1(&self) -> f64 {
        self.residual_x + self.residual_y
    }
}

/// Maps a recognition response for one montage back to face ids.
///
/// A recognized face counts only when its center sits in the middle third
/// of a cell (both residuals under `block / 6`). When several land on the
/// same face, the one nearest the cell center wins; ties keep the first.
/// An unrecognized face anywhere inside a cell (residuals under
/// `block / 2`) that sits nearer the center than the current candidate
/// removes that candidate. The removed label is not replaced by another
/// recognized face. Boxes outside the populated cells are ignored.
///
/// Labels come out in ascending face id order.
pub fn decode(
    response: &RecognitionResponse,
    geometry: &MontageGeometry,
) -> Vec<IdentificationLabel> {
    if geometry.block_size == 0 || geometry.is_empty() {
        return Vec::new();
    }
    let half = (geometry.block_size / 2) as f64;
    let sixth = (geometry.block_size / 6) as f64;

    let mut candidates: BTreeMap<FaceId, Candidate> = BTreeMap::new();

    for face in &response.recognized {
        let hit = CellHit::locate(&face.bbox, geometry);
        if !hit.within(sixth) {
            continue;
        }
        let Some(face_id) = geometry.face_id_at(hit.gx, hit.gy) else {
            continue;
        };
        let candidate = Candidate {
            name: face.name.clone(),
            confidence: face.confidence,
            l1: hit.l1(),
        };
        match candidates.get(&face_id) {
            Some(existing) if existing.l1 <= candidate.l1 => {}
            _ => {
                candidates.insert(face_id, candidate);
            }
        }
    }

    for bbox in &response.unrecognized {
        let hit = CellHit::locate(bbox, geometry);
        if !hit.within(half) {
            continue;
        }
        let Some(face_id) = geometry.face_id_at(hit.gx, hit.gy) else {
            continue;
        };
        if candidates
            .get(&face_id)
            .is_some_and(|existing| existing.l1 > hit.l1())
        {
            log::debug!("Dropping label for face {face_id}: unrecognized face nearer the cell center");
            candidates.remove(&face_id);
        }
    }

    candidates
        .into_iter()
        .map(|(face_id, c)| IdentificationLabel {
            face_id,
            name: c.name,
            confidence: c.confidence,
        })
        .collect()
}
