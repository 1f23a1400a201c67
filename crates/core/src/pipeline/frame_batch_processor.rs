use std::ops::Range;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::sampling::time_sampler::TimeSampler;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{BATCH_SIZE, CROP_EXPAND, DILATE_AMOUNT};
use crate::shared::frame::Frame;
use crate::shared::SendError;
use crate::video::domain::frame_source::FrameSource;

/// Faces found in one sampled frame.
///
/// `bboxes`, `embeddings` and `crops` are parallel lists in detector order.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFaces {
    pub slot: usize,
    pub frame_num: usize,
    pub bboxes: Vec<BoundingBox>,
    pub embeddings: Vec<Vec<f32>>,
    pub crops: Vec<Frame>,
}

/// Runs detection and embedding over one partition of sample slots.
///
/// Each worker owns its own `FrameSource`; the detector and embedder are
/// shared read-only.
pub struct FrameBatchProcessor<'a> {
    sampler: &'a TimeSampler,
    detector: &'a dyn FaceDetector,
    embedder: &'a dyn FaceEmbedder,
    batch_size: usize,
}

impl<'a> FrameBatchProcessor<'a> {
    pub fn new(
        sampler: &'a TimeSampler,
        detector: &'a dyn FaceDetector,
        embedder: &'a dyn FaceEmbedder,
    ) -> Self {
        Self {
            sampler,
            detector,
            embedder,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Processes `slots` in time order and returns one entry per slot.
    ///
    /// The first frame that fails to decode ends the partition: everything
    /// gathered so far is returned and the shortfall is caught at merge
    /// time. A detector or embedder failure ends the partition the same way.
    pub fn process(&self, source: &mut dyn FrameSource, slots: Range<usize>) -> Vec<FrameFaces> {
        let mut results = Vec::with_capacity(slots.len());
        let mut start = slots.start;

        while start < slots.end {
            let end = (start + self.batch_size).min(slots.end);

            let mut frames = Vec::with_capacity(end - start);
            let mut decode_failed = false;
            for slot in start..end {
                let frame_num = self.sampler.frame_number(slot);
                match source.read_frame(frame_num) {
                    Ok(frame) => frames.push((slot, frame)),
                    Err(e) => {
                        log::warn!("Failed to decode frame {frame_num} (slot {slot}): {e}");
                        decode_failed = true;
                        break;
                    }
                }
            }
            if decode_failed {
                return results;
            }

            match self.process_batch(frames) {
                Ok(batch) => results.extend(batch),
                Err(e) => {
                    log::warn!("Face analysis failed for slots {start}..{end}: {e}");
                    return results;
                }
            }
            start = end;
        }

        results
    }

    fn process_batch(&self, frames: Vec<(usize, Frame)>) -> Result<Vec<FrameFaces>, SendError> {
        let images: Vec<Frame> = frames.iter().map(|(_, f)| f.clone()).collect();
        let detections = self.detector.detect(&images)?;
        if detections.len() != images.len() {
            return Err(format!(
                "Detector returned {} results for {} frames",
                detections.len(),
                images.len()
            )
            .into());
        }

        let mut tight_crops = Vec::new();
        let mut square_crops: Vec<Vec<Frame>> = Vec::with_capacity(images.len());
        for (frame, boxes) in images.iter().zip(&detections) {
            let (w, h) = (frame.width(), frame.height());
            let mut squares = Vec::with_capacity(boxes.len());
            for bbox in boxes {
                let dilated = bbox.dilate(DILATE_AMOUNT);
                tight_crops.push(frame.crop(&dilated.crop_rect(w, h, 0.0, false)));
                squares.push(frame.crop(&dilated.crop_rect(w, h, CROP_EXPAND, true)));
            }
            square_crops.push(squares);
        }

        let embeddings = if tight_crops.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&tight_crops)?
        };
        if embeddings.len() != tight_crops.len() {
            return Err(format!(
                "Embedder returned {} vectors for {} crops",
                embeddings.len(),
                tight_crops.len()
            )
            .into());
        }

        let mut embeddings = embeddings.into_iter();
        Ok(frames
            .into_iter()
            .zip(detections)
            .zip(square_crops)
            .map(|(((slot, _), bboxes), crops)| FrameFaces {
                slot,
                frame_num: self.sampler.frame_number(slot),
                embeddings: embeddings.by_ref().take(bboxes.len()).collect(),
                bboxes,
                crops,
            })
            .collect())
    }
}
