use std::path::Path;

use crate::pipeline::error::{PipelineError, Result};

/// Human-readable class names, indexed by model output position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Load labels from a text file with one label per line.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Labels(format!("{}: {e}", path.display())))?;
        Ok(Self::parse(&contents))
    }

    /// Parse newline-separated labels. Trailing blank lines are dropped.
    pub fn parse(contents: &str) -> Self {
        let mut names: Vec<String> = contents
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        while names.last().is_some_and(|l| l.trim().is_empty()) {
            names.pop();
        }
        Self { names }
    }

    /// Label for a class index, or `None` when the model emits more classes
    /// than the label file lists.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
