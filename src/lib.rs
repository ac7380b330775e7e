pub mod capture;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod model;
pub mod pipeline;

pub use capture::frame::{Frame, FrameMailbox};
pub use capture::source::{ExternalFeed, FrameSource, SyntheticCamera};
pub use config::types::PipelineConfig;
pub use diagnostics::stats::StatsSnapshot;
pub use engine::backend::{InferenceEngine, InputTensor, Session};
#[cfg(feature = "ort")]
pub use engine::onnx::OnnxEngine;
pub use engine::synthetic::SyntheticEngine;
pub use model::types::{Architecture, ModelSelection};
pub use pipeline::coordinator::SwitchOutcome;
pub use pipeline::error::{PipelineError, Result};
pub use pipeline::report::{Classification, FrameReport, ReportReceiver, ResultSink};
pub use pipeline::{Pipeline, PipelineBuilder};
