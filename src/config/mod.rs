// Pipeline configuration file.

pub mod store;
pub mod types;
