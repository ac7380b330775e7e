use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::backend::{InferenceEngine, InputTensor, Session};
use crate::pipeline::error::{PipelineError, Result};

const DEFAULT_CLASS_COUNT: usize = 5;

/// An inference engine that needs no model runtime.
///
/// Any non-empty byte blob builds a session; the session derives a fixed
/// score profile from the bytes and shifts it with the mean of the input, so
/// different model variants produce visibly different rankings. Optional
/// build and run delays simulate model compilation and inference cost.
///
/// Enable via `SYNTHETIC_ENGINE=1` environment variable.
pub struct SyntheticEngine {
    class_count: usize,
    build_delay: Duration,
    run_delay: Duration,
    live_sessions: Arc<AtomicUsize>,
}

impl SyntheticEngine {
    pub fn new(class_count: usize) -> Self {
        Self {
            class_count,
            build_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            live_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether the synthetic engine is forced on via environment variable.
    pub fn is_enabled() -> bool {
        std::env::var("SYNTHETIC_ENGINE").is_ok_and(|v| v == "1" || v == "true")
    }

    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Sessions built and not yet released.
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_COUNT)
    }
}

impl InferenceEngine for SyntheticEngine {
    fn build_session(&self, model_bytes: &[u8]) -> Result<Box<dyn Session>> {
        if model_bytes.is_empty() {
            return Err(PipelineError::SessionBuild("model bytes are empty".into()));
        }
        if self.class_count == 0 {
            return Err(PipelineError::SessionBuild(
                "model declares no output classes".into(),
            ));
        }
        if !self.build_delay.is_zero() {
            std::thread::sleep(self.build_delay);
        }

        let seed = fnv1a(model_bytes);
        let profile = (0..self.class_count)
            .map(|i| {
                let mixed = seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                (mixed % 1000) as f32 / 250.0
            })
            .collect();

        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSession {
            profile,
            run_delay: self.run_delay,
            live_sessions: Arc::clone(&self.live_sessions),
            released: false,
        }))
    }
}

/// Session produced by [`SyntheticEngine`].
pub struct SyntheticSession {
    profile: Vec<f32>,
    run_delay: Duration,
    live_sessions: Arc<AtomicUsize>,
    released: bool,
}

impl Session for SyntheticSession {
    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>> {
        if self.released {
            return Err(PipelineError::Inference("session already released".into()));
        }
        if input.data.len() != input.expected_len() {
            return Err(PipelineError::Inference(format!(
                "input has {} values, shape {:?} needs {}",
                input.data.len(),
                input.shape,
                input.expected_len()
            )));
        }
        if !self.run_delay.is_zero() {
            std::thread::sleep(self.run_delay);
        }

        let mean = if input.data.is_empty() {
            0.0
        } else {
            input.data.iter().sum::<f32>() / input.data.len() as f32
        };
        Ok(self
            .profile
            .iter()
            .enumerate()
            .map(|(i, p)| p + mean * (i as f32 + 1.0) * 0.1)
            .collect())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.live_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// FNV-1a over the model bytes; gives each variant a stable score profile.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
