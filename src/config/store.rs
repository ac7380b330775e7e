use std::path::Path;

use crate::config::types::PipelineConfig;
use crate::pipeline::error::{PipelineError, Result};

/// Loads and saves the pipeline configuration file.
pub struct ConfigStore;

impl ConfigStore {
    /// Load configuration from a JSON file, returning defaults on a missing
    /// file. The loaded values are validated.
    pub fn load(path: &Path) -> Result<PipelineConfig> {
        if !path.exists() {
            return Ok(PipelineConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let config: PipelineConfig = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate().map_err(PipelineError::Config)?;
        Ok(config)
    }

    /// Save configuration atomically (write .tmp then rename).
    pub fn save(path: &Path, config: &PipelineConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::Config(e.to_string()))?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(())
    }
}
