// Frame capture: camera feed and preprocessing.

pub mod frame;
pub mod preprocess;
pub mod source;
