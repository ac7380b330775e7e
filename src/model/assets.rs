use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::model::types::ModelSelection;
use crate::pipeline::error::{PipelineError, Result};

/// Resolves a model selection to the raw bytes of its model file.
///
/// Implementations are pure lookups. When the requested architecture has no
/// asset, the default architecture at the same precision is used instead;
/// only when that is missing too does resolution fail with `AssetNotFound`.
pub trait ModelAssetStore: Send + Sync {
    fn resolve(&self, selection: &ModelSelection) -> Result<Vec<u8>>;
}

/// Asset store backed by a directory of `<architecture>_<precision>.ort` files.
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, selection: &ModelSelection) -> Option<std::io::Result<Vec<u8>>> {
        let path = self.root.join(selection.asset_key());
        if !path.is_file() {
            return None;
        }
        Some(std::fs::read(&path))
    }
}

impl ModelAssetStore for DirectoryAssetStore {
    fn resolve(&self, selection: &ModelSelection) -> Result<Vec<u8>> {
        let read = |s: &ModelSelection| match self.read(s) {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(PipelineError::AssetNotFound(format!(
                "{}: {e}",
                self.root.join(s.asset_key()).display()
            ))),
            None => Ok(None),
        };
        resolve_with_fallback(selection, read)
    }
}

/// Asset store holding model bytes in memory.
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: HashMap<ModelSelection, Vec<u8>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bytes for a selection, replacing any previous entry.
    pub fn insert(&mut self, selection: ModelSelection, bytes: Vec<u8>) {
        self.assets.insert(selection, bytes);
    }

    pub fn with_asset(mut self, selection: ModelSelection, bytes: Vec<u8>) -> Self {
        self.insert(selection, bytes);
        self
    }
}

impl ModelAssetStore for InMemoryAssetStore {
    fn resolve(&self, selection: &ModelSelection) -> Result<Vec<u8>> {
        resolve_with_fallback(selection, |s| Ok(self.assets.get(s).cloned()))
    }
}

/// Look up `selection`, then the default architecture at the same precision.
fn resolve_with_fallback<F>(selection: &ModelSelection, lookup: F) -> Result<Vec<u8>>
where
    F: Fn(&ModelSelection) -> Result<Option<Vec<u8>>>,
{
    if let Some(bytes) = lookup(selection)? {
        return Ok(bytes);
    }

    let fallback = selection.with_default_architecture();
    if fallback != *selection {
        if let Some(bytes) = lookup(&fallback)? {
            tracing::warn!("No model asset for {selection}, falling back to {fallback}");
            return Ok(bytes);
        }
    }

    Err(PipelineError::AssetNotFound(selection.asset_key()))
}
