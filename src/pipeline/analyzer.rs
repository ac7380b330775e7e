use parking_lot::Mutex;
use std::sync::Arc;

use crate::capture::frame::Frame;
use crate::capture::preprocess::FramePreprocessor;
use crate::engine::backend::Session;
use crate::model::types::ModelSelection;
use crate::pipeline::clock::Clock;
use crate::pipeline::error::{PipelineError, Result};
use crate::pipeline::report::Classification;

/// Callback receiving each frame's classification.
pub type ResultCallback = Arc<dyn Fn(Classification) + Send + Sync>;

/// Per-frame processing settings shared by every analyzer of a pipeline.
#[derive(Clone)]
pub struct AnalyzerOptions {
    pub top_k: usize,
    pub apply_softmax: bool,
    pub preprocessor: Arc<dyn FramePreprocessor>,
    pub clock: Arc<dyn Clock>,
}

/// Runs delivered frames through one session.
///
/// Owns its session exclusively and releases it on drop. Built once per
/// model selection and never mutated afterwards.
pub struct Analyzer {
    generation: u64,
    selection: ModelSelection,
    session: Mutex<Box<dyn Session>>,
    options: AnalyzerOptions,
    on_result: ResultCallback,
}

impl Analyzer {
    pub fn new(
        generation: u64,
        selection: ModelSelection,
        session: Box<dyn Session>,
        options: AnalyzerOptions,
        on_result: ResultCallback,
    ) -> Self {
        Self {
            generation,
            selection,
            session: Mutex::new(session),
            options,
            on_result,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selection(&self) -> ModelSelection {
        self.selection
    }

    /// Classify one frame and hand the result to the callback.
    ///
    /// Failures skip the frame; the analyzer stays usable.
    pub fn process_frame(&self, frame: &Frame) -> Result<()> {
        match self.classify(frame) {
            Ok(classification) => {
                (self.on_result)(classification);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping frame {}us on {} (generation {}): {e}",
                    frame.timestamp_us,
                    self.selection,
                    self.generation
                );
                Err(e)
            }
        }
    }

    /// Preprocess, run and rank one frame. Only the session call is timed.
    pub fn classify(&self, frame: &Frame) -> Result<Classification> {
        let input = self.options.preprocessor.prepare(frame)?;

        let (raw, elapsed) = {
            let mut session = self.session.lock();
            let start = self.options.clock.now();
            let raw = session.run(&input)?;
            (raw, self.options.clock.now().saturating_sub(start))
        };

        let (scores, class_indices) =
            top_k(&raw, self.options.top_k, self.options.apply_softmax)?;

        Ok(Classification {
            scores,
            class_indices,
            process_time_nanos: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            generation: self.generation,
            selection: self.selection,
        })
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        self.session.get_mut().release();
        tracing::debug!(
            "released session for {} (generation {})",
            self.selection,
            self.generation
        );
    }
}

/// Rank raw scores, keeping the `k` best with their source indices.
///
/// Ties keep the lower index first. Fewer than `k` classes yield every
/// class. Non-finite scores or an empty output are inference errors.
pub fn top_k(raw: &[f32], k: usize, apply_softmax: bool) -> Result<(Vec<f32>, Vec<usize>)> {
    if raw.is_empty() {
        return Err(PipelineError::Inference("model produced no scores".into()));
    }
    if let Some(index) = raw.iter().position(|v| !v.is_finite()) {
        return Err(PipelineError::Inference(format!(
            "non-finite score at class {index}"
        )));
    }

    let values = if apply_softmax {
        softmax(raw)
    } else {
        raw.to_vec()
    };

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
    order.truncate(k);

    let scores = order.iter().map(|&i| values[i]).collect();
    Ok((scores, order))
}

/// Numerically stable softmax.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
