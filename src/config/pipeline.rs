use crate::pipeline::{PipelineParams, PipelineStage};
use crate::region::RegionId;
use crate::services::{RenderOptions, SolverConfig};
use crate::warp::Interpolation;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Runtime configuration as read from a JSON file.
#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    pub owner: String,
    pub project: String,
    pub region: String,
    #[serde(default = "default_tier")]
    pub first_tier: u32,
    #[serde(default = "default_tier")]
    pub last_tier: u32,
    #[serde(default = "default_max_pixels")]
    pub max_pixels_per_dimension: u32,
    #[serde(default = "default_neighbor_distance")]
    pub layer_neighbor_distance: usize,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default)]
    pub keep_existing: Option<PipelineStage>,
    pub solver: SolverConfig,
    #[serde(default)]
    pub warp_interpolation: Interpolation,
}

fn default_tier() -> u32 {
    1
}

fn default_max_pixels() -> u32 {
    2048
}

fn default_neighbor_distance() -> usize {
    2
}

impl RuntimeConfig {
    pub fn rough_region(&self) -> RegionId {
        RegionId::new(self.owner.clone(), self.project.clone(), self.region.clone())
    }

    pub fn to_params(&self) -> PipelineParams {
        PipelineParams {
            rough_region: self.rough_region(),
            first_tier: self.first_tier,
            last_tier: self.last_tier,
            max_pixels_per_dimension: self.max_pixels_per_dimension,
            layer_neighbor_distance: self.layer_neighbor_distance,
            render: self.render.clone(),
            keep_existing: self.keep_existing,
            solver: Arc::new(self.solver.clone()),
            warp_interpolation: self.warp_interpolation,
        }
    }
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let config: RuntimeConfig = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(config)
}
