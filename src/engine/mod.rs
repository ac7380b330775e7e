// Inference engine seam.

pub mod backend;
#[cfg(feature = "ort")]
pub mod onnx;
pub mod synthetic;
