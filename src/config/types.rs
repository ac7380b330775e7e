use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::types::ModelSelection;

fn default_top_k() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_input_size() -> u32 {
    224
}

/// Pipeline configuration, read from a camelCase JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Entries kept per classification.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Convert raw scores to probabilities before ranking.
    #[serde(default = "default_true")]
    pub apply_softmax: bool,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    /// Directory of `<architecture>_<precision>.ort` model files.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    /// Class label file, one label per line.
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
    /// Selection installed when the pipeline starts.
    #[serde(default)]
    pub default_selection: ModelSelection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            apply_softmax: true,
            input_width: default_input_size(),
            input_height: default_input_size(),
            model_dir: None,
            labels_path: None,
            default_selection: ModelSelection::default(),
        }
    }
}

/// Largest accepted `inputWidth` / `inputHeight`.
pub const MAX_INPUT_SIZE: u32 = 4096;

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("topK must be at least 1".to_string());
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err("input dimensions must be positive".to_string());
        }
        if self.input_width > MAX_INPUT_SIZE || self.input_height > MAX_INPUT_SIZE {
            return Err(format!(
                "input dimensions must not exceed {MAX_INPUT_SIZE}x{MAX_INPUT_SIZE}"
            ));
        }
        Ok(())
    }
}
