use crate::pipeline::error::Result;

/// Preprocessed model input in NCHW layout.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    /// `[batch, channels, height, width]`.
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Number of elements the shape calls for.
    pub fn expected_len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A loaded model able to run one frame at a time.
///
/// A session is owned by exactly one analyzer and is never run from two
/// threads at once.
pub trait Session: Send {
    /// Run one input through the network and return raw class scores, one
    /// per class in model output order.
    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>>;

    /// Free engine resources. Called once when the owning analyzer is
    /// superseded or the pipeline shuts down.
    fn release(&mut self) {}
}

/// Builds sessions from raw model bytes.
///
/// Implementations may be slow (model compilation) and are only called from
/// the session-build worker, never from the frame path.
pub trait InferenceEngine: Send + Sync {
    fn build_session(&self, model_bytes: &[u8]) -> Result<Box<dyn Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::PipelineError;

    struct FixedSession {
        scores: Vec<f32>,
        released: bool,
    }

    impl Session for FixedSession {
        fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>> {
            if input.data.len() != input.expected_len() {
                return Err(PipelineError::Inference("shape mismatch".into()));
            }
            Ok(self.scores.clone())
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    struct FixedEngine;

    impl InferenceEngine for FixedEngine {
        fn build_session(&self, model_bytes: &[u8]) -> Result<Box<dyn Session>> {
            if model_bytes.is_empty() {
                return Err(PipelineError::SessionBuild("empty model".into()));
            }
            Ok(Box::new(FixedSession {
                scores: vec![0.5, 0.25],
                released: false,
            }))
        }
    }

    #[test]
    fn expected_len_is_product_of_shape() {
        let tensor = InputTensor::new([1, 3, 2, 2], vec![0.0; 12]);
        assert_eq!(tensor.expected_len(), 12);
    }

    #[test]
    fn engine_rejects_empty_bytes() {
        let result = FixedEngine.build_session(&[]);
        assert!(matches!(result, Err(PipelineError::SessionBuild(_))));
    }

    #[test]
    fn session_reports_shape_mismatch() {
        let mut session = FixedEngine.build_session(&[1]).unwrap();
        let bad = InputTensor::new([1, 3, 2, 2], vec![0.0; 3]);
        assert!(matches!(session.run(&bad), Err(PipelineError::Inference(_))));
    }

    #[test]
    fn release_is_observable() {
        let mut session = FixedSession {
            scores: vec![],
            released: false,
        };
        session.release();
        assert!(session.released);
    }

    #[test]
    fn trait_objects_are_send() {
        fn assert_send<T: Send>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send::<Box<dyn Session>>();
        assert_send_sync::<Box<dyn InferenceEngine>>();
    }
}
