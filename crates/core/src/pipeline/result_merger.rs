use thiserror::Error;

use crate::pipeline::frame_batch_processor::FrameFaces;
use crate::shared::face_record::{FaceId, FaceRecord};
use crate::shared::frame::Frame;

#[derive(Error, Debug, PartialEq)]
pub enum MergeError {
    #[error("expected {expected} sampled frames, got {actual}; a worker stopped early")]
    MissingSamples { expected: usize, actual: usize },
    #[error("face count mismatch: {bboxes} boxes, {embeddings} embeddings, {crops} crops")]
    CountMismatch {
        bboxes: usize,
        embeddings: usize,
        crops: usize,
    },
}

/// All faces of one video, keyed by face id.
///
/// The three lists share one face id sequence `0..n`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedFaces {
    pub records: Vec<(FaceId, FaceRecord)>,
    pub embeddings: Vec<(FaceId, Vec<f32>)>,
    pub crops: Vec<(FaceId, Frame)>,
}

impl MergedFaces {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Joins per-partition results into one time-ordered face sequence.
pub struct ResultMerger;

impl ResultMerger {
    /// Concatenates `partitions` in the order given and numbers faces with a
    /// single running counter.
    ///
    /// `partitions` must be in partition order, never completion order.
    /// Fails unless exactly `expected_slots` frames arrived and every
    /// artifact list ends up the same length.
    pub fn merge(
        partitions: Vec<Vec<FrameFaces>>,
        expected_slots: usize,
    ) -> Result<MergedFaces, MergeError> {
        let actual: usize = partitions.iter().map(|p| p.len()).sum();
        if actual != expected_slots {
            return Err(MergeError::MissingSamples {
                expected: expected_slots,
                actual,
            });
        }

        let mut merged = MergedFaces::default();
        let mut next_id: FaceId = 0;
        for frame in partitions.into_iter().flatten() {
            let first = next_id;
            for bbox in frame.bboxes {
                merged.records.push((
                    next_id,
                    FaceRecord {
                        frame_num: frame.frame_num,
                        bbox,
                    },
                ));
                next_id += 1;
            }
            merged
                .embeddings
                .extend((first..).zip(frame.embeddings));
            merged.crops.extend((first..).zip(frame.crops));
        }

        let (bboxes, embeddings, crops) = (
            merged.records.len(),
            merged.embeddings.len(),
            merged.crops.len(),
        );
        if bboxes != embeddings || bboxes != crops {
            return Err(MergeError::CountMismatch {
                bboxes,
                embeddings,
                crops,
            });
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;

    fn frame_faces(slot: usize, faces: usize) -> FrameFaces {
        FrameFaces {
            slot,
            frame_num: slot * 30,
            bboxes: (0..faces)
                .map(|k| BoundingBox::new(0.1 * k as f64, 0.0, 0.1 * k as f64 + 0.05, 0.1))
                .collect(),
            embeddings: (0..faces).map(|k| vec![slot as f32, k as f32]).collect(),
            crops: (0..faces)
                .map(|_| Frame::new(vec![0; 12], 2, 2, 3, 0))
                .collect(),
        }
    }

    #[test]
    fn test_ids_follow_partition_then_frame_then_detection_order() {
        let partitions = vec![
            vec![frame_faces(0, 2), frame_faces(1, 0)],
            vec![frame_faces(2, 1), frame_faces(3, 3)],
        ];
        let merged = ResultMerger::merge(partitions, 4).unwrap();

        let ids: Vec<FaceId> = merged.records.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);

        let frames: Vec<usize> = merged.records.iter().map(|(_, r)| r.frame_num).collect();
        assert_eq!(frames, vec![0, 0, 60, 90, 90, 90]);

        assert_eq!(merged.embeddings[2], (2, vec![2.0, 0.0]));
        assert_eq!(merged.embeddings[5], (5, vec![3.0, 2.0]));
        assert_eq!(merged.crops.last().map(|(id, _)| *id), Some(5));
    }

    #[test]
    fn test_no_faces_is_valid() {
        let merged = ResultMerger::merge(vec![vec![frame_faces(0, 0)], vec![]], 1).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_short_partition_is_rejected() {
        let partitions = vec![vec![frame_faces(0, 1)], vec![frame_faces(2, 1)]];
        assert_eq!(
            ResultMerger::merge(partitions, 3),
            Err(MergeError::MissingSamples {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_embedding_count_mismatch_is_rejected() {
        let mut broken = frame_faces(1, 2);
        broken.embeddings.pop();
        let partitions = vec![vec![frame_faces(0, 1), broken]];

        assert_eq!(
            ResultMerger::merge(partitions, 2),
            Err(MergeError::CountMismatch {
                bboxes: 3,
                embeddings: 2,
                crops: 3
            })
        );
    }
}
