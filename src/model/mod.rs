// Model catalogue: architectures, asset lookup and labels.

pub mod assets;
pub mod labels;
pub mod types;
