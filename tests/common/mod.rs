//! In-memory service implementations backing the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tier_align::error::ServiceError;
use tier_align::region::RegionId;
use tier_align::services::{MatchBatch, MatchService, RegionStore, SolveService, SolverConfig, WarpRenderer};
use tier_align::tier::TierCell;
use tier_align::types::Bounds;
use tier_align::warp::{AffineModel, AffineWarpField};

fn layer_key(layer: f64) -> String {
    layer.to_string()
}

#[derive(Clone, Debug, Default)]
pub struct RegionRecord {
    pub bounds: Option<Bounds>,
    pub layers: Vec<f64>,
    pub cell: Option<TierCell>,
    pub models: HashMap<String, AffineModel>,
    pub complete: bool,
}

/// Region store over a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryStore {
    regions: Mutex<HashMap<RegionId, RegionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_region(&self, id: &RegionId, bounds: Bounds, layers: Vec<f64>) {
        self.regions.lock().unwrap().insert(
            id.clone(),
            RegionRecord {
                bounds: Some(bounds),
                layers,
                ..RegionRecord::default()
            },
        );
    }

    pub fn put_aligned_region(&self, id: &RegionId, models: HashMap<String, AffineModel>) {
        self.regions.lock().unwrap().insert(
            id.clone(),
            RegionRecord {
                models,
                ..RegionRecord::default()
            },
        );
    }

    pub fn stored_cell(&self, id: &RegionId) -> Option<TierCell> {
        self.regions
            .lock()
            .unwrap()
            .get(id)
            .and_then(|record| record.cell.clone())
    }

    pub fn region_names(&self, owner: &str, project: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .regions
            .lock()
            .unwrap()
            .keys()
            .filter(|id| id.owner == owner && id.project == project)
            .map(|id| id.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_complete(&self, id: &RegionId) -> bool {
        self.regions
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|record| record.complete)
    }
}

impl RegionStore for InMemoryStore {
    fn region_exists(&self, id: &RegionId) -> Result<bool, ServiceError> {
        Ok(self.regions.lock().unwrap().contains_key(id))
    }

    fn region_bounds(&self, id: &RegionId) -> Result<Bounds, ServiceError> {
        self.regions
            .lock()
            .unwrap()
            .get(id)
            .and_then(|record| record.bounds)
            .ok_or_else(|| ServiceError::new(format!("no bounds for region {id}")))
    }

    fn layer_values(&self, id: &RegionId) -> Result<Vec<f64>, ServiceError> {
        self.regions
            .lock()
            .unwrap()
            .get(id)
            .map(|record| record.layers.clone())
            .ok_or_else(|| ServiceError::new(format!("region {id} not found")))
    }

    fn create_cell_region(
        &self,
        id: &RegionId,
        cell: &TierCell,
        layers: &[f64],
    ) -> Result<u64, ServiceError> {
        self.regions.lock().unwrap().insert(
            id.clone(),
            RegionRecord {
                bounds: Some(*cell.full_scale_bounds()),
                layers: layers.to_vec(),
                cell: Some(cell.clone()),
                ..RegionRecord::default()
            },
        );
        Ok(layers.len() as u64)
    }

    fn create_derived_region(
        &self,
        source: &RegionId,
        target: &RegionId,
    ) -> Result<(), ServiceError> {
        let mut regions = self.regions.lock().unwrap();
        let template = regions
            .get(source)
            .cloned()
            .ok_or_else(|| ServiceError::new(format!("source region {source} not found")))?;
        regions.insert(
            target.clone(),
            RegionRecord {
                bounds: template.bounds,
                layers: template.layers,
                ..RegionRecord::default()
            },
        );
        Ok(())
    }

    fn delete_region(&self, id: &RegionId) -> Result<(), ServiceError> {
        self.regions.lock().unwrap().remove(id);
        Ok(())
    }

    fn list_regions(&self, owner: &str, project: &str) -> Result<Vec<RegionId>, ServiceError> {
        Ok(self
            .regions
            .lock()
            .unwrap()
            .keys()
            .filter(|id| id.owner == owner && id.project == project)
            .cloned()
            .collect())
    }

    fn delete_project_regions(&self, owner: &str, project: &str) -> Result<(), ServiceError> {
        self.regions
            .lock()
            .unwrap()
            .retain(|id, _| !(id.owner == owner && id.project == project));
        Ok(())
    }

    fn set_cell_data(&self, id: &RegionId, cell: &TierCell) -> Result<(), ServiceError> {
        let mut regions = self.regions.lock().unwrap();
        let record = regions
            .get_mut(id)
            .ok_or_else(|| ServiceError::new(format!("region {id} not found")))?;
        record.cell = Some(cell.clone());
        Ok(())
    }

    fn cell_data(&self, id: &RegionId) -> Result<Option<TierCell>, ServiceError> {
        Ok(self
            .regions
            .lock()
            .unwrap()
            .get(id)
            .and_then(|record| record.cell.clone()))
    }

    fn layer_model(&self, id: &RegionId, layer: f64) -> Result<Option<AffineModel>, ServiceError> {
        Ok(self
            .regions
            .lock()
            .unwrap()
            .get(id)
            .and_then(|record| record.models.get(&layer_key(layer)).cloned()))
    }

    fn mark_complete(&self, id: &RegionId) -> Result<(), ServiceError> {
        let mut regions = self.regions.lock().unwrap();
        let record = regions
            .get_mut(id)
            .ok_or_else(|| ServiceError::new(format!("region {id} not found")))?;
        record.complete = true;
        Ok(())
    }
}

/// Match service persisting one pair count per requested collection.
#[derive(Default)]
pub struct StubMatcher {
    counts: Mutex<HashMap<String, u64>>,
    pub generate_calls: AtomicUsize,
    /// When set, every generated collection saves zero pairs.
    pub save_nothing: bool,
}

impl StubMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

impl MatchService for StubMatcher {
    fn generate(
        &self,
        _owner: &str,
        batch: &MatchBatch,
    ) -> Result<HashMap<String, u64>, ServiceError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let mut saved = HashMap::new();
        let mut counts = self.counts.lock().unwrap();
        for request in &batch.requests {
            let count = if self.save_nothing {
                0
            } else {
                request.pairs.len() as u64
            };
            if count > 0 {
                counts.insert(request.collection.clone(), count);
            }
            saved.insert(request.collection.clone(), count);
        }
        Ok(saved)
    }

    fn collection_pair_counts(&self, _owner: &str) -> Result<HashMap<String, u64>, ServiceError> {
        Ok(self.counts.lock().unwrap().clone())
    }

    fn delete_collection(&self, _owner: &str, collection: &str) -> Result<(), ServiceError> {
        self.counts.lock().unwrap().remove(collection);
        Ok(())
    }
}

/// Solver writing one translation model per layer into the aligned region.
pub struct StubSolver {
    store: Arc<InMemoryStore>,
    pub fail_cells: HashSet<String>,
    solved: Mutex<Vec<String>>,
}

impl StubSolver {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            fail_cells: HashSet::new(),
            solved: Mutex::new(Vec::new()),
        }
    }

    pub fn solved_cells(&self) -> Vec<String> {
        let mut cells = self.solved.lock().unwrap().clone();
        cells.sort();
        cells
    }
}

impl SolveService for StubSolver {
    fn solve(&self, cell: &TierCell, _config: &SolverConfig) -> Result<f64, ServiceError> {
        let split_name = cell.split_region_id().name;
        if self.fail_cells.contains(&split_name) {
            return Err(ServiceError::new("solver exited with status 1"));
        }

        let layers = self.store.layer_values(&cell.parent_region_id())?;
        let model = AffineModel::from_coefficients([
            1.0,
            0.0,
            f64::from(cell.column()),
            0.0,
            1.0,
            f64::from(cell.row()),
        ]);
        let models = layers
            .iter()
            .map(|&layer| (layer_key(layer), model.clone()))
            .collect();
        self.store
            .put_aligned_region(&cell.aligned_region_id(), models);

        self.solved.lock().unwrap().push(split_name);
        Ok(0.9)
    }
}

/// Renderer recording every layer it is asked to warp.
#[derive(Default)]
pub struct StubRenderer {
    rendered: Mutex<Vec<(String, f64, usize)>>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered_layers(&self) -> Vec<(String, f64, usize)> {
        let mut layers = self.rendered.lock().unwrap().clone();
        layers.sort_by(|a, b| (a.0.as_str(), a.1).partial_cmp(&(b.0.as_str(), b.1)).unwrap());
        layers
    }
}

impl WarpRenderer for StubRenderer {
    fn render_layer(
        &self,
        _source: &RegionId,
        target: &RegionId,
        layer: f64,
        field: &AffineWarpField,
    ) -> Result<u64, ServiceError> {
        self.rendered.lock().unwrap().push((
            target.name.clone(),
            layer,
            field.row_count() * field.column_count(),
        ));
        Ok(1)
    }
}

pub fn solver_config() -> SolverConfig {
    SolverConfig {
        script: "/opt/solve.sh".into(),
        parameters_template: "/opt/template.json".into(),
    }
}
