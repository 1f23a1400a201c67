use thiserror::Error;

/// Normalized box as reported by the service: top-left corner plus size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServiceBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ServiceBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Center in pixels of a `montage_w` x `montage_h` image.
    pub fn pixel_center(&self, montage_w: f64, montage_h: f64) -> (f64, f64) {
        let x0 = self.left;
        let y0 = self.top;
        let x1 = x0 + self.width;
        let y1 = y0 + self.height;
        ((x0 + x1) / 2.0 * montage_w, (y0 + y1) / 2.0 * montage_h)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecognizedFace {
    pub name: String,
    pub confidence: f64,
    pub bbox: ServiceBox,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct RecognitionResponse {
    pub recognized: Vec<RecognizedFace>,
    /// Faces the service found but could not name.
    pub unrecognized: Vec<ServiceBox>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("transient recognition failure: {0}")]
    Transient(String),
    #[error("recognition failed: {0}")]
    Fatal(String),
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl RecognitionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecognitionError::Transient(_))
    }
}

/// External celebrity-recognition capability: one encoded image in, named
/// and unnamed face boxes out.
pub trait RecognitionService: Send + Sync {
    fn recognize(&self, image: &[u8]) -> Result<RecognitionResponse, RecognitionError>;
}
