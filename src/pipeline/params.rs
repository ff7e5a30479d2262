use crate::pipeline::PipelineStage;
use crate::region::RegionId;
use crate::services::{RenderOptions, SolverConfig};
use crate::warp::Interpolation;
use std::sync::Arc;

/// Pipeline-wide parameters, fixed for the duration of a run.
///
/// The solver configuration is shared read-only with every worker; holding
/// it behind an `Arc` with no interior mutability makes that sharing safe by
/// construction.
#[derive(Clone, Debug)]
pub struct PipelineParams {
    /// Rough source region every tier derives from.
    pub rough_region: RegionId,
    /// First tier to generate (>= 1).
    pub first_tier: u32,
    /// Last tier to generate.
    pub last_tier: u32,
    /// Scale each cell so its largest dimension stays within this budget.
    pub max_pixels_per_dimension: u32,
    /// Match layers whose distance from the current layer is at most this.
    pub layer_neighbor_distance: usize,
    /// Canvas rendering options for match derivation.
    pub render: RenderOptions,
    /// Keep all prior existing results up to and including this stage, for
    /// the first requested tier only.
    pub keep_existing: Option<PipelineStage>,
    /// Read-only solver configuration distributed once to all workers.
    pub solver: Arc<SolverConfig>,
    /// Interpolation carried by the synthesized warp fields.
    pub warp_interpolation: Interpolation,
}

impl PipelineParams {
    pub fn new(rough_region: RegionId, solver: SolverConfig) -> Self {
        Self {
            rough_region,
            first_tier: 1,
            last_tier: 1,
            max_pixels_per_dimension: 2048,
            layer_neighbor_distance: 2,
            render: RenderOptions::default(),
            keep_existing: None,
            solver: Arc::new(solver),
            warp_interpolation: Interpolation::default(),
        }
    }
}
