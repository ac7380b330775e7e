// Diagnostics: inference latency statistics.

pub mod stats;
