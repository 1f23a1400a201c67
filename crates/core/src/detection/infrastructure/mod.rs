pub mod math;
pub mod model_resolver;
pub mod onnx_arcface_embedder;
pub mod onnx_session;
pub mod onnx_yolo_detector;
