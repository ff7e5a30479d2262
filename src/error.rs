//! Error taxonomy for the tiered alignment pipeline.
//!
//! Three failure classes with different blast radii:
//! - [`ConfigError`]: fatal, aborts the run (inconsistent merge dimensions,
//!   invalid pixel budget, a tier that produced no cells).
//! - [`ServiceError`]: an external collaborator (region store, matcher,
//!   solver, renderer) failed; never retried by the core.
//! - [`TaskError`]: one cell or layer failed inside a stage; recorded in the
//!   stage report without blocking sibling tasks, so an idempotent re-run
//!   retries exactly the missing cells.

use crate::pipeline::PipelineStage;
use serde::Serialize;
use thiserror::Error;

/// Fatal configuration problems that abort the run.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{context} is inconsistent, expected {expected} but was {actual}")]
    Inconsistent {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("pixel budget must be positive")]
    InvalidPixelBudget,

    #[error("parent bounds have a degenerate extent ({width} x {height})")]
    DegenerateBounds { width: f64, height: f64 },

    #[error("tier {tier} split needs a {cells}x{cells} grid, above the {limit} per-dimension limit")]
    ExcessiveGrid { tier: u32, cells: u32, limit: u32 },

    #[error("tier {tier} of {region} produced no cells")]
    EmptyTier { tier: u32, region: String },

    #[error("warp field builder holds no consensus sets")]
    NoConsensusSets,
}

/// Failure reported by one of the external collaborator services.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure of a single per-cell (or per-layer) task within a stage.
#[derive(Clone, Debug, Error, Serialize)]
#[error("{stage} failed for {region}: {source}")]
pub struct TaskError {
    pub stage: PipelineStage,
    pub region: String,
    #[source]
    pub source: ServiceError,
}

impl TaskError {
    pub fn new(stage: PipelineStage, region: impl Into<String>, source: ServiceError) -> Self {
        Self {
            stage,
            region: region.into(),
            source,
        }
    }
}

/// Driver-level pipeline error: either a fatal configuration problem or an
/// external-service failure surfaced by the stage that hit it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
