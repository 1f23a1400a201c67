//! YOLO face detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference and NMS post-processing, then
//! maps surviving boxes back into normalized frame coordinates.

use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::onnx_session::open_session;
use crate::detection::infrastructure::math::bbox_iou;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::SendError;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session: Mutex::new(session),
            confidence,
            input_size,
        })
    }

    fn detect_one(&self, frame: &Frame) -> Result<Vec<BoundingBox>, SendError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);
        let input_value =
            ort::value::Tensor::from_array(input_tensor).map_err(|e| e.to_string())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| e.to_string())?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| e.to_string())?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }

        // [1, features, detections] is transposed relative to [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw_dets = Vec::new();
        for i in 0..num_dets {
            let feature = |f: usize| {
                if transposed {
                    data[f * num_dets + i]
                } else {
                    data[i * num_feats + f]
                }
            };

            // row format: [cx, cy, w, h, conf, keypoints...]
            if num_feats < 5 {
                break;
            }
            let conf = feature(4) as f64;
            if conf < self.confidence {
                continue;
            }

            let cx = feature(0) as f64;
            let cy = feature(1) as f64;
            let w = feature(2) as f64;
            let h = feature(3) as f64;

            raw_dets.push(RawDetection {
                bbox: [
                    ((cx - w / 2.0) - pad_x as f64) / scale,
                    ((cy - h / 2.0) - pad_y as f64) / scale,
                    ((cx + w / 2.0) - pad_x as f64) / scale,
                    ((cy + h / 2.0) - pad_y as f64) / scale,
                ],
                confidence: conf,
            });
        }

        let kept = nms(&mut raw_dets, NMS_IOU_THRESH);
        Ok(kept
            .iter()
            .map(|d| normalize(&d.bbox, frame.width(), frame.height()))
            .collect())
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&self, frames: &[Frame]) -> Result<Vec<Vec<BoundingBox>>, SendError> {
        frames.iter().map(|f| self.detect_one(f)).collect()
    }
}

/// Map a pixel-space `[x1, y1, x2, y2]` into a clamped normalized box.
fn normalize(bbox: &[f64; 4], width: u32, height: u32) -> BoundingBox {
    let w = width as f64;
    let h = height as f64;
    BoundingBox::new(
        (bbox[0] / w).clamp(0.0, 1.0),
        (bbox[1] / h).clamp(0.0, 1.0),
        (bbox[2] / w).clamp(0.0, 1.0),
        (bbox[3] / h).clamp(0.0, 1.0),
    )
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    bbox: [f64; 4],
    confidence: f64,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
///
/// The returned order (highest confidence first) is the per-frame
/// detection order that face ids follow.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(&k.bbox, &det.bbox) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}
