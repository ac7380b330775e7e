use thiserror::Error;

/// Classification pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model asset not found: {0}")]
    AssetNotFound(String),

    #[error("session build failed: {0}")]
    SessionBuild(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("frame preprocessing failed: {0}")]
    Preprocess(String),

    #[error("pipeline is shut down")]
    ShutDown,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("label file unreadable: {0}")]
    Labels(String),
}

impl PipelineError {
    /// Whether the error only affects the current swap or frame.
    ///
    /// Everything except a denied camera permission or a shut-down pipeline
    /// leaves the pipeline running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::PermissionDenied(_) | Self::ShutDown)
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
