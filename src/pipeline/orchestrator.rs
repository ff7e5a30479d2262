use crate::cluster::{CanvasClusters, CanvasId};
use crate::error::{ConfigError, PipelineError, ServiceError, TaskError};
use crate::pipeline::{PipelineParams, PipelineStage, StageReport, TierReport};
use crate::region::RegionId;
use crate::services::{
    MatchBatch, MatchRequest, MatchService, OrderedCanvasPair, RegionStore, SolveService,
    WarpRenderer,
};
use crate::tier::{plan_tier, TierCell};
use crate::types::Bounds;
use crate::warp::ConsensusWarpFieldBuilder;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Total potential pair count below which a tier's matches run as one
/// combined batch regardless of per-cell size.
const COMBINED_BATCH_PAIR_LIMIT: u64 = 1_000;

/// Total potential pair count below which combined batching is still used
/// when a per-cell batch would under-utilize the worker pool.
const COMBINED_BATCH_TOTAL_LIMIT: u64 = 100_000;

/// Drives one tier at a time through the SPLIT, MATCH, ALIGN and WARP
/// stages against the four collaborator services.
///
/// Every identity a stage needs is derived from the cells it receives, and
/// every stage returns its results instead of mutating shared state, so two
/// pipelines over disjoint regions can run side by side.
pub struct AlignmentPipeline<'a> {
    store: &'a dyn RegionStore,
    matcher: &'a dyn MatchService,
    solver: &'a dyn SolveService,
    renderer: &'a dyn WarpRenderer,
    params: PipelineParams,
}

impl<'a> AlignmentPipeline<'a> {
    pub fn new(
        store: &'a dyn RegionStore,
        matcher: &'a dyn MatchService,
        solver: &'a dyn SolveService,
        renderer: &'a dyn WarpRenderer,
        params: PipelineParams,
    ) -> Self {
        Self {
            store,
            matcher,
            solver,
            renderer,
            params,
        }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Runs every requested tier in order, returning one report per tier.
    ///
    /// Per-cell failures are collected into the reports and do not stop the
    /// run; configuration errors and driver-level service failures abort.
    pub fn run(&self) -> Result<Vec<TierReport>, PipelineError> {
        let rough = &self.params.rough_region;
        let layers = self.store.layer_values(rough)?;
        info!(
            "AlignmentPipeline::run: {} layers in {}, tiers {}..={}",
            layers.len(),
            rough,
            self.params.first_tier,
            self.params.last_tier
        );

        let mut keep = self.params.keep_existing;
        let mut reports = Vec::new();
        for tier in self.params.first_tier..=self.params.last_tier {
            reports.push(self.run_tier(tier, &layers, keep)?);
            // only the first requested tier may be partially resumed;
            // subsequent tiers always run in full
            keep = None;
        }
        Ok(reports)
    }

    fn run_tier(
        &self,
        tier: u32,
        layers: &[f64],
        keep: Option<PipelineStage>,
    ) -> Result<TierReport, PipelineError> {
        let rough = &self.params.rough_region;
        let parent_id = RegionId::parent_for_tier(rough, tier);
        let parent_bounds = self.store.region_bounds(&parent_id)?;

        let (mut cells, split) = self.split_tier(tier, &parent_bounds, layers, keep)?;
        let matching = self.match_tier(&mut cells, layers, keep)?;
        let align = self.align_tier(&mut cells, keep)?;
        let warp = self.warp_tier(tier, &cells, &parent_id, &parent_bounds, layers, keep)?;

        Ok(TierReport {
            tier,
            cell_count: cells.len(),
            split,
            matching,
            align,
            warp,
        })
    }

    fn split_tier(
        &self,
        tier: u32,
        parent_bounds: &Bounds,
        layers: &[f64],
        keep: Option<PipelineStage>,
    ) -> Result<(Vec<TierCell>, StageReport), PipelineError> {
        let start = Instant::now();
        let rough = &self.params.rough_region;

        let mut cells = plan_tier(
            rough,
            parent_bounds,
            self.params.max_pixels_per_dimension,
            tier,
        )?;
        if cells.is_empty() {
            return Err(ConfigError::EmptyTier {
                tier,
                region: rough.to_string(),
            }
            .into());
        }
        info!(
            "AlignmentPipeline::split_tier: tier={} -> {} cells",
            tier,
            cells.len()
        );

        let tier_project = RegionId::project_for_tier(rough, tier);
        let existing: HashSet<RegionId> = if stage_kept(keep, PipelineStage::Split) {
            let found = self.store.list_regions(&rough.owner, &tier_project)?;
            info!(
                "AlignmentPipeline::split_tier: found {} existing regions in {}",
                found.len(),
                tier_project
            );
            found.into_iter().collect()
        } else {
            self.store.delete_project_regions(&rough.owner, &tier_project)?;
            HashSet::new()
        };

        for cell in &mut cells {
            let id = cell.split_region_id();
            if existing.contains(&id) {
                if let Some(stored) = self.store.cell_data(&id)? {
                    cell.carry_forward(&stored);
                }
            }
        }

        let failures: Vec<TaskError> = cells
            .par_iter()
            .filter(|cell| !existing.contains(&cell.split_region_id()))
            .filter_map(|cell| {
                let id = cell.split_region_id();
                match self.store.create_cell_region(&id, cell, layers) {
                    Ok(canvases) => {
                        debug!(
                            "AlignmentPipeline::split_tier: created {} with {} canvases",
                            id.name, canvases
                        );
                        None
                    }
                    Err(err) => Some(TaskError::new(PipelineStage::Split, id.name, err)),
                }
            })
            .collect();

        let skipped = cells
            .iter()
            .filter(|cell| existing.contains(&cell.split_region_id()))
            .count();
        let processed = cells.len() - skipped - failures.len();
        let report = StageReport::new(
            PipelineStage::Split,
            elapsed_ms(start),
            processed,
            skipped,
            failures,
        );
        Ok((cells, report))
    }

    fn match_tier(
        &self,
        cells: &mut [TierCell],
        layers: &[f64],
        keep: Option<PipelineStage>,
    ) -> Result<StageReport, PipelineError> {
        let start = Instant::now();
        let owner = self.params.rough_region.owner.clone();
        let existing_counts = self.matcher.collection_pair_counts(&owner)?;

        if stage_kept(keep, PipelineStage::Match) {
            for cell in cells.iter_mut() {
                // count stays None when the collection does not exist yet
                cell.set_saved_match_pair_count(
                    existing_counts.get(&cell.match_collection()).copied(),
                );
            }
        } else {
            for cell in cells.iter_mut() {
                let collection = cell.match_collection();
                if existing_counts.contains_key(&collection) {
                    self.matcher.delete_collection(&owner, &collection)?;
                }
                if !cell.requires_match_derivation() {
                    cell.set_saved_match_pair_count(None);
                    self.persist_cell(cell)?;
                }
            }
        }

        let pending = cells
            .iter()
            .filter(|cell| cell.requires_match_derivation())
            .count();
        let per_cell = potential_pairs(layers.len(), self.params.layer_neighbor_distance);
        let total = per_cell * cells.len() as u64;
        let parallelism = rayon::current_num_threads() as u64;
        debug!(
            "AlignmentPipeline::match_tier: pending={} per_cell={} total={} parallelism={}",
            pending, per_cell, total, parallelism
        );

        if pending > 0 {
            self.log_match_connectivity(cells, layers);
        }

        let failures = if total < COMBINED_BATCH_PAIR_LIMIT
            || (per_cell < parallelism && total < COMBINED_BATCH_TOTAL_LIMIT)
        {
            self.generate_matches_combined(cells, layers, &owner)?
        } else {
            self.generate_matches_per_cell(cells, layers, &owner)
        };

        let processed = pending - failures.len().min(pending);
        let report = StageReport::new(
            PipelineStage::Match,
            elapsed_ms(start),
            processed,
            cells.len() - pending,
            failures,
        );
        Ok(report)
    }

    /// One batch covering every cell still needing matches. A batch-level
    /// service failure aborts the stage, since no cell's counts are usable.
    fn generate_matches_combined(
        &self,
        cells: &mut [TierCell],
        layers: &[f64],
        owner: &str,
    ) -> Result<Vec<TaskError>, PipelineError> {
        let requests: Vec<MatchRequest> = cells
            .iter()
            .filter(|cell| cell.requires_match_derivation())
            .map(|cell| MatchRequest {
                collection: cell.match_collection(),
                pairs: neighbor_pairs(cell, layers, self.params.layer_neighbor_distance),
            })
            .collect();
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let batch = MatchBatch {
            render: self.params.render.clone(),
            requests,
        };
        info!(
            "AlignmentPipeline::match_tier: combined batch of {} pairs across {} collections",
            batch.pair_count(),
            batch.requests.len()
        );

        let counts = self.matcher.generate(owner, &batch)?;

        let mut failures = Vec::new();
        for cell in cells
            .iter_mut()
            .filter(|cell| cell.requires_match_derivation())
        {
            let count = counts.get(&cell.match_collection()).copied().unwrap_or(0);
            cell.set_saved_match_pair_count(Some(count));
            if let Err(err) = self.persist_cell(cell) {
                failures.push(TaskError::new(
                    PipelineStage::Match,
                    cell.split_region_id().name,
                    err,
                ));
            }
        }
        Ok(failures)
    }

    /// One batch per cell, fanned out over the worker pool. A failing cell
    /// is recorded and left without a pair count so a re-run retries it.
    fn generate_matches_per_cell(
        &self,
        cells: &mut [TierCell],
        layers: &[f64],
        owner: &str,
    ) -> Vec<TaskError> {
        let distance = self.params.layer_neighbor_distance;
        cells
            .par_iter_mut()
            .filter(|cell| cell.requires_match_derivation())
            .filter_map(|cell| {
                let collection = cell.match_collection();
                let batch = MatchBatch {
                    render: self.params.render.clone(),
                    requests: vec![MatchRequest {
                        collection: collection.clone(),
                        pairs: neighbor_pairs(cell, layers, distance),
                    }],
                };
                let outcome = self.matcher.generate(owner, &batch).and_then(|counts| {
                    let count = counts.get(&collection).copied().unwrap_or(0);
                    debug!(
                        "AlignmentPipeline::match_tier: {} saved {} pairs",
                        collection, count
                    );
                    cell.set_saved_match_pair_count(Some(count));
                    self.persist_cell(cell)
                });
                match outcome {
                    Ok(()) => None,
                    Err(err) => Some(TaskError::new(
                        PipelineStage::Match,
                        cell.split_region_id().name,
                        err,
                    )),
                }
            })
            .collect()
    }

    /// Logs the connectivity of the correspondence graph about to be
    /// requested, clustering canvases linked by a pair.
    fn log_match_connectivity(&self, cells: &[TierCell], layers: &[f64]) {
        let distance = self.params.layer_neighbor_distance;
        let edges = cells
            .iter()
            .filter(|cell| cell.requires_match_derivation())
            .flat_map(|cell| neighbor_pairs(cell, layers, distance))
            .map(|pair| (pair.p, pair.q));
        let clusters = CanvasClusters::from_matches(edges);
        debug!(
            "AlignmentPipeline::match_tier: requested match graph has {}",
            clusters
        );
    }

    fn align_tier(
        &self,
        cells: &mut [TierCell],
        keep: Option<PipelineStage>,
    ) -> Result<StageReport, PipelineError> {
        let start = Instant::now();

        let with_matches = cells.iter().filter(|cell| cell.has_match_pairs()).count();
        let mut to_align: HashSet<RegionId> = HashSet::new();
        for cell in cells.iter() {
            if !cell.has_match_pairs() {
                continue;
            }
            if stage_kept(keep, PipelineStage::Align)
                && self.store.region_exists(&cell.aligned_region_id())?
            {
                continue;
            }
            to_align.insert(cell.split_region_id());
        }

        if to_align.is_empty() {
            info!("AlignmentPipeline::align_tier: all aligned results already exist");
            return Ok(StageReport::new(
                PipelineStage::Align,
                elapsed_ms(start),
                0,
                with_matches,
                Vec::new(),
            ));
        }
        info!(
            "AlignmentPipeline::align_tier: solving {} of {} cells with matches",
            to_align.len(),
            with_matches
        );

        // remove stale results for every cell about to be re-solved
        for cell in cells
            .iter()
            .filter(|cell| to_align.contains(&cell.split_region_id()))
        {
            self.store.delete_region(&cell.aligned_region_id())?;
        }

        let config = Arc::clone(&self.params.solver);
        let failures: Vec<TaskError> = cells
            .par_iter_mut()
            .filter(|cell| to_align.contains(&cell.split_region_id()))
            .filter_map(|cell| {
                let outcome = self.solver.solve(cell, &config).and_then(|quality| {
                    debug!(
                        "AlignmentPipeline::align_tier: {} quality {:.6}",
                        cell, quality
                    );
                    cell.set_alignment_quality(Some(quality));
                    self.persist_cell(cell)
                });
                match outcome {
                    Ok(()) => None,
                    Err(err) => Some(TaskError::new(
                        PipelineStage::Align,
                        cell.split_region_id().name,
                        err,
                    )),
                }
            })
            .collect();

        let processed = to_align.len() - failures.len();
        Ok(StageReport::new(
            PipelineStage::Align,
            elapsed_ms(start),
            processed,
            with_matches - to_align.len(),
            failures,
        ))
    }

    fn warp_tier(
        &self,
        tier: u32,
        cells: &[TierCell],
        parent_id: &RegionId,
        parent_bounds: &Bounds,
        layers: &[f64],
        keep: Option<PipelineStage>,
    ) -> Result<StageReport, PipelineError> {
        let start = Instant::now();
        let rough = &self.params.rough_region;
        let warp_id = RegionId::warp_for_tier(rough, tier);

        if stage_kept(keep, PipelineStage::Warp) && self.store.region_exists(&warp_id)? {
            info!("AlignmentPipeline::warp_tier: {} already exists", warp_id);
            return Ok(StageReport::new(
                PipelineStage::Warp,
                elapsed_ms(start),
                0,
                layers.len(),
                Vec::new(),
            ));
        }

        let aligned: Vec<&TierCell> = cells
            .iter()
            .filter(|cell| cell.alignment_quality().is_some())
            .collect();
        if aligned.is_empty() {
            warn!(
                "AlignmentPipeline::warp_tier: tier {} has no aligned cells, skipping warp synthesis",
                tier
            );
            return Ok(StageReport::new(
                PipelineStage::Warp,
                elapsed_ms(start),
                0,
                layers.len(),
                Vec::new(),
            ));
        }

        self.store.delete_region(&warp_id)?;
        self.store.create_derived_region(rough, &warp_id)?;

        let grid_size = cells[0].total_rows() as usize;
        let failures: Vec<TaskError> = layers
            .par_iter()
            .filter_map(|&layer| {
                match self.synthesize_layer(
                    layer,
                    parent_id,
                    &warp_id,
                    parent_bounds,
                    &aligned,
                    grid_size,
                ) {
                    Ok(tiles) => {
                        debug!(
                            "AlignmentPipeline::warp_tier: layer {} -> {} tiles",
                            layer, tiles
                        );
                        None
                    }
                    Err(err) => Some(TaskError::new(
                        PipelineStage::Warp,
                        format!("{} layer {}", warp_id.name, layer),
                        err,
                    )),
                }
            })
            .collect();

        if failures.is_empty() {
            self.store.mark_complete(&warp_id)?;
        }

        let processed = layers.len() - failures.len();
        Ok(StageReport::new(
            PipelineStage::Warp,
            elapsed_ms(start),
            processed,
            0,
            failures,
        ))
    }

    /// Builds one layer's deformation field from the aligned cells' fitted
    /// models and renders the warped output. Each contributing model is
    /// tagged with its cell's full-scale center, so nearest-neighbor
    /// assignment also covers cells whose own alignment failed.
    fn synthesize_layer(
        &self,
        layer: f64,
        parent_id: &RegionId,
        warp_id: &RegionId,
        parent_bounds: &Bounds,
        aligned: &[&TierCell],
        grid_size: usize,
    ) -> Result<u64, ServiceError> {
        let mut builder = ConsensusWarpFieldBuilder::new(
            parent_bounds.width(),
            parent_bounds.height(),
            grid_size,
            grid_size,
        );

        for cell in aligned {
            if let Some(model) = self.store.layer_model(&cell.aligned_region_id(), layer)? {
                let center = cell.full_scale_bounds().center();
                let local = [
                    center[0] - parent_bounds.min_x,
                    center[1] - parent_bounds.min_y,
                ];
                builder.add_consensus_set_data(model, &[local]);
            }
        }

        if builder.is_empty() {
            return Err(ServiceError::new(format!(
                "no aligned models available for layer {layer}"
            )));
        }

        let field = builder
            .build(self.params.warp_interpolation)
            .map_err(|err| ServiceError::new(err.to_string()))?;
        self.renderer.render_layer(parent_id, warp_id, layer, &field)
    }

    fn persist_cell(&self, cell: &TierCell) -> Result<(), ServiceError> {
        self.store.set_cell_data(&cell.split_region_id(), cell)
    }
}

/// Number of layer pairs matching can request for one cell: every ordered
/// pair of layers at most `neighbor_distance` apart.
pub fn potential_pairs(layer_count: usize, neighbor_distance: usize) -> u64 {
    let n = layer_count as u64;
    let d = neighbor_distance as u64;
    if d >= n {
        triangular(n.saturating_sub(1))
    } else {
        n * d - triangular(d)
    }
}

fn triangular(n: u64) -> u64 {
    n * (n + 1) / 2
}

/// Same-cell canvas pairs for every layer within `distance` of another.
fn neighbor_pairs(cell: &TierCell, layers: &[f64], distance: usize) -> Vec<OrderedCanvasPair> {
    let n = layers.len();
    let mut pairs = Vec::with_capacity(n.saturating_mul(distance));
    for i in 0..n {
        let p = CanvasId::new(layers[i].to_string(), cell.tile_id_for_layer(layers[i]));
        for layer in layers.iter().take(n.min(i + distance + 1)).skip(i + 1) {
            let q = CanvasId::new(layer.to_string(), cell.tile_id_for_layer(*layer));
            pairs.push(OrderedCanvasPair::new(p.clone(), q));
        }
    }
    pairs
}

fn stage_kept(keep: Option<PipelineStage>, stage: PipelineStage) -> bool {
    keep.is_some_and(|kept_through| stage <= kept_through)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
