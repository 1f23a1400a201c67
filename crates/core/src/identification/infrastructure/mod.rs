pub mod http_recognition_service;
pub mod png_montage_encoder;
