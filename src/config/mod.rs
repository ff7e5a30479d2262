//! Runtime configuration loading for the pipeline binaries.

pub mod pipeline;

pub use pipeline::{load_config, RuntimeConfig};
