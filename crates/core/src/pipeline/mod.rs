pub mod detect_faces_use_case;
pub mod frame_batch_processor;
pub mod identify_faces_use_case;
pub mod infrastructure;
pub mod pipeline_executor;
pub mod pipeline_logger;
pub mod result_merger;
