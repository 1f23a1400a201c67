//! ArcFace face embedder using ONNX Runtime.
//!
//! Each crop is resized to the model's 112x112 input and the output vector
//! is L2-normalized, so dot products between embeddings are cosine
//! similarities.

use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::infrastructure::onnx_session::open_session;
use crate::detection::infrastructure::math::l2_normalize;
use crate::shared::frame::Frame;
use crate::shared::SendError;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
}

impl OnnxArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: Mutex::new(open_session(model_path)?),
        })
    }

    fn embed_one(&self, crop: &Frame) -> Result<Vec<f32>, SendError> {
        if crop.is_empty() {
            return Err("Cannot embed an empty crop".into());
        }
        let tensor = preprocess(crop.data(), crop.width(), crop.height());
        let input_value = ort::value::Tensor::from_array(tensor).map_err(|e| e.to_string())?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| e.to_string())?;
        let embedding_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| e.to_string())?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl FaceEmbedder for OnnxArcFaceEmbedder {
    fn embed(&self, crops: &[Frame]) -> Result<Vec<Vec<f32>>, SendError> {
        crops.iter().map(|c| self.embed_one(c)).collect()
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}
