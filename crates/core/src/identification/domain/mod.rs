pub mod identification_decoder;
pub mod identification_label;
pub mod montage;
pub mod montage_builder;
pub mod recognition_service;
pub mod retrying_client;
