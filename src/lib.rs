#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod cluster;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod region;
pub mod services;
pub mod tier;
pub mod types;
pub mod warp;

// --- High-level re-exports -------------------------------------------------

// Main entry points: the pipeline and its per-tier reports.
pub use crate::pipeline::{AlignmentPipeline, PipelineParams, PipelineStage, TierReport};

// Planner and the cell record everything downstream keys on.
pub use crate::region::RegionId;
pub use crate::tier::{plan_tier, TierCell};

// Warp-field synthesis.
pub use crate::warp::{AffineModel, AffineWarpField, ConsensusWarpFieldBuilder};

// Connectivity analysis of match data.
pub use crate::cluster::{CanvasClusters, CanvasId};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use tier_align::prelude::*;
///
/// let rough = RegionId::new("demoOwner", "demoProject", "roughTiles");
/// let bounds = Bounds::new(0.0, 0.0, 14585.0, 18542.0);
/// let cells = plan_tier(&rough, &bounds, 4096, 1).expect("tier plan");
/// println!("{} cells at scale {:.6}", cells.len(), cells[0].scale());
/// ```
pub mod prelude {
    pub use crate::pipeline::{AlignmentPipeline, PipelineParams, PipelineStage};
    pub use crate::region::RegionId;
    pub use crate::tier::{plan_tier, TierCell};
    pub use crate::types::Bounds;
    pub use crate::warp::{AffineWarpField, ConsensusWarpFieldBuilder};
}
