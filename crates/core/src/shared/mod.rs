pub mod bounding_box;
pub mod constants;
pub mod face_record;
pub mod frame;
pub mod video_metadata;

/// Error type for work that crosses thread boundaries.
pub type SendError = Box<dyn std::error::Error + Send + Sync>;
