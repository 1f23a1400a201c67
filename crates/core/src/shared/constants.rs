pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Seconds between two consecutive sample slots.
pub const DEFAULT_INTERVAL_SECS: u32 = 3;

/// Slots decoded and sent through detection/embedding together.
pub const BATCH_SIZE: usize = 16;

/// Box dilation factor: low edges scale by `2 - D`, high edges by `D`.
pub const DILATE_AMOUNT: f64 = 1.05;

/// Normalized margin added around each box before the square crop.
pub const CROP_EXPAND: f64 = 0.1;

/// Hard payload cap of the recognition service.
pub const MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const MIN_PAYLOAD_DIMENSION: u32 = 50;

pub const MAX_SERVICE_ATTEMPTS: u32 = 10;

pub const DEFAULT_MONTAGE_COLUMNS: u32 = 10;
pub const DEFAULT_MONTAGE_ROWS: u32 = 10;
pub const DEFAULT_BLOCK_SIZE: u32 = 160;

/// Upper bound on videos identified concurrently.
pub const MAX_VIDEO_WORKERS: usize = 4;

/// Ceiling on recognition calls in flight across all videos.
pub const MAX_IN_FLIGHT_CALLS: usize = 60;

pub const FILE_METADATA: &str = "metadata.json";
pub const FILE_BBOXES: &str = "bboxes.json";
pub const FILE_EMBEDS: &str = "embeddings.json";
pub const FILE_IDENTITIES: &str = "identities.json";
pub const DIR_CROPS: &str = "crops";

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v", "mpg", "ts"];
