//! Four-stage tiered alignment pipeline.
//!
//! Overview
//! - SPLIT plans the tier grid and creates one scaled split region per cell,
//!   carrying forward any progress persisted by an earlier run.
//! - MATCH derives neighbor-layer point correspondences per cell, batching
//!   either the whole tier or one cell at a time depending on how much work
//!   the tier holds.
//! - ALIGN batch-solves every cell with matches, distributing one read-only
//!   solver configuration to all workers.
//! - WARP fuses the aligned cells' models into a per-layer deformation field
//!   and materializes the warped output region.
//!
//! Stages run strictly in order; within a stage, cells (or layers) fan out
//! as independent tasks with no shared mutable state. Every stage is
//! idempotent: a `keep_existing` stage reuses outputs that already exist, so
//! a re-run resumes exactly at the missing cells. Per-cell failures are
//! collected into the stage report and never block sibling cells.

mod orchestrator;
mod params;
mod report;

pub use orchestrator::{potential_pairs, AlignmentPipeline};
pub use params::PipelineParams;
pub use report::{StageReport, TierReport};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four ordered pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineStage {
    Split,
    Match,
    Align,
    Warp,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Split => "SPLIT",
            PipelineStage::Match => "MATCH",
            PipelineStage::Align => "ALIGN",
            PipelineStage::Warp => "WARP",
        };
        f.write_str(name)
    }
}
