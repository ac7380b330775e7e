// ONNX Runtime engine for real model files.

use ort::session::Session as OrtSession;
use ort::value::Tensor;
use tracing::debug;

use crate::engine::backend::{InferenceEngine, InputTensor, Session};
use crate::pipeline::error::{PipelineError, Result};

/// Builds ONNX Runtime sessions from in-memory model files.
#[derive(Debug, Clone, Default)]
pub struct OnnxEngine {
    intra_threads: Option<usize>,
}

impl OnnxEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the threads one session uses for a single run.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads.max(1));
        self
    }
}

fn build_error(e: ort::Error) -> PipelineError {
    PipelineError::SessionBuild(e.to_string())
}

impl InferenceEngine for OnnxEngine {
    fn build_session(&self, model_bytes: &[u8]) -> Result<Box<dyn Session>> {
        if model_bytes.is_empty() {
            return Err(PipelineError::SessionBuild("empty model file".into()));
        }

        let mut builder = OrtSession::builder().map_err(build_error)?;
        if let Some(threads) = self.intra_threads {
            builder = builder.with_intra_threads(threads).map_err(build_error)?;
        }
        let session = builder.commit_from_memory(model_bytes).map_err(build_error)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| PipelineError::SessionBuild("model declares no inputs".into()))?;
        debug!(
            "onnx session ready ({} bytes, input `{input_name}`)",
            model_bytes.len()
        );

        Ok(Box::new(OnnxSession {
            session: Some(session),
            input_name,
        }))
    }
}

/// One loaded ONNX model. Feeds the first declared input and reads the first
/// output as class scores.
pub struct OnnxSession {
    session: Option<OrtSession>,
    input_name: String,
}

impl Session for OnnxSession {
    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>> {
        if input.data.len() != input.expected_len() {
            return Err(PipelineError::Inference(format!(
                "tensor holds {} values, shape {:?} needs {}",
                input.data.len(),
                input.shape,
                input.expected_len()
            )));
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PipelineError::Inference("session already released".into()))?;

        let tensor = Tensor::from_array((input.shape, input.data.clone().into_boxed_slice()))
            .map_err(|e| PipelineError::Inference(e.to_string()))?
            .into_dyn();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        let (_, scores) = outputs
            .iter()
            .next()
            .ok_or_else(|| PipelineError::Inference("model produced no outputs".into()))?;
        let (_shape, data) = scores
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Inference(e.to_string()))?;
        Ok(data.to_vec())
    }

    fn release(&mut self) {
        if self.session.take().is_some() {
            debug!("onnx session released");
        }
    }
}
