//! Abstract contracts for the external collaborators the pipeline drives.
//!
//! The core never talks to a wire protocol directly: region metadata, point
//! matching, model solving and tile synthesis are all reached through these
//! traits. Implementations decide transport and retry policy; the core
//! surfaces their failures untouched as [`ServiceError`]s.

use crate::cluster::CanvasId;
use crate::error::ServiceError;
use crate::region::RegionId;
use crate::tier::TierCell;
use crate::types::Bounds;
use crate::warp::{AffineModel, AffineWarpField};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Canvas rendering and filtering options applied when deriving matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Render scale for match canvases. Split-cell canvases are already
    /// scaled down, so the pipeline renders them at full scale.
    pub scale: f64,
    /// Apply the intensity-correction filter while rendering.
    pub with_filter: bool,
    /// Fill canvases with noise before rendering to stabilise matching.
    pub fill_with_noise: bool,
    /// Include masks; scape canvases always keep them.
    pub include_masks: bool,
    /// Optional clip applied to each canvas before matching.
    pub clip: Option<Bounds>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            with_filter: true,
            fill_with_noise: true,
            include_masks: true,
            clip: None,
        }
    }
}

/// Canvas pair ordered so that `p <= q`, giving every pair one canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderedCanvasPair {
    pub p: CanvasId,
    pub q: CanvasId,
}

impl OrderedCanvasPair {
    pub fn new(a: CanvasId, b: CanvasId) -> Self {
        if a <= b {
            Self { p: a, q: b }
        } else {
            Self { p: b, q: a }
        }
    }
}

/// Correspondence requests destined for one named match collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRequest {
    pub collection: String,
    pub pairs: Vec<OrderedCanvasPair>,
}

/// A batch of correspondence work: shared render options plus one or more
/// per-collection requests, so a single batch can span a whole tier
/// (combined mode) or exactly one cell (per-cell mode).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchBatch {
    pub render: RenderOptions,
    pub requests: Vec<MatchRequest>,
}

impl MatchBatch {
    pub fn pair_count(&self) -> usize {
        self.requests.iter().map(|request| request.pairs.len()).sum()
    }
}

/// Read-only solver configuration distributed once to all workers of a tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub script: PathBuf,
    pub parameters_template: PathBuf,
}

/// Metadata and region persistence.
pub trait RegionStore: Send + Sync {
    fn region_exists(&self, id: &RegionId) -> Result<bool, ServiceError>;

    fn region_bounds(&self, id: &RegionId) -> Result<Bounds, ServiceError>;

    /// Layer values of the region, ascending.
    fn layer_values(&self, id: &RegionId) -> Result<Vec<f64>, ServiceError>;

    /// Creates one split-cell region with a canvas per layer; returns the
    /// number of canvases created. The cell is persisted as the region's
    /// hierarchical data blob.
    fn create_cell_region(
        &self,
        id: &RegionId,
        cell: &TierCell,
        layers: &[f64],
    ) -> Result<u64, ServiceError>;

    /// Creates an empty region inheriting the source region's metadata.
    fn create_derived_region(&self, source: &RegionId, target: &RegionId)
        -> Result<(), ServiceError>;

    /// Deletes the region if it exists; deleting a missing region is not an
    /// error.
    fn delete_region(&self, id: &RegionId) -> Result<(), ServiceError>;

    fn list_regions(&self, owner: &str, project: &str) -> Result<Vec<RegionId>, ServiceError>;

    fn delete_project_regions(&self, owner: &str, project: &str) -> Result<(), ServiceError>;

    /// Persists the opaque hierarchical data blob attached to a region.
    fn set_cell_data(&self, id: &RegionId, cell: &TierCell) -> Result<(), ServiceError>;

    fn cell_data(&self, id: &RegionId) -> Result<Option<TierCell>, ServiceError>;

    /// Fitted model of one layer of an aligned region, if present.
    fn layer_model(&self, id: &RegionId, layer: f64) -> Result<Option<AffineModel>, ServiceError>;

    /// Marks a fully written region complete.
    fn mark_complete(&self, id: &RegionId) -> Result<(), ServiceError>;
}

/// Point-correspondence derivation and storage.
pub trait MatchService: Send + Sync {
    /// Renders and matches every requested pair, persisting correspondences
    /// into each request's collection; returns saved pair counts per
    /// collection.
    fn generate(&self, owner: &str, batch: &MatchBatch)
        -> Result<HashMap<String, u64>, ServiceError>;

    /// Saved pair counts of every existing collection of this owner.
    fn collection_pair_counts(&self, owner: &str) -> Result<HashMap<String, u64>, ServiceError>;

    fn delete_collection(&self, owner: &str, collection: &str) -> Result<(), ServiceError>;
}

/// Model fitting for one cell's correspondences.
pub trait SolveService: Send + Sync {
    /// Fits models from the cell's match collection, persists them into the
    /// cell's aligned region, and returns the scalar alignment quality.
    fn solve(&self, cell: &TierCell, config: &SolverConfig) -> Result<f64, ServiceError>;
}

/// Deformed tile synthesis.
pub trait WarpRenderer: Send + Sync {
    /// Renders one layer of the source region through the warp field into
    /// the target region; returns the number of tiles written.
    fn render_layer(
        &self,
        source: &RegionId,
        target: &RegionId,
        layer: f64,
        field: &AffineWarpField,
    ) -> Result<u64, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_construction_is_canonical() {
        let a = CanvasId::new("1.0", "tile-a");
        let b = CanvasId::new("2.0", "tile-b");
        let forward = OrderedCanvasPair::new(a.clone(), b.clone());
        let reverse = OrderedCanvasPair::new(b, a);
        assert_eq!(forward, reverse);
        assert_eq!(forward.p.group_id, "1.0");
    }

    #[test]
    fn batch_pair_count_sums_requests() {
        let pair = OrderedCanvasPair::new(
            CanvasId::new("1.0", "a"),
            CanvasId::new("2.0", "b"),
        );
        let batch = MatchBatch {
            render: RenderOptions::default(),
            requests: vec![
                MatchRequest {
                    collection: "c1".to_string(),
                    pairs: vec![pair.clone(), pair.clone()],
                },
                MatchRequest {
                    collection: "c2".to_string(),
                    pairs: vec![pair],
                },
            ],
        };
        assert_eq!(batch.pair_count(), 3);
    }
}
