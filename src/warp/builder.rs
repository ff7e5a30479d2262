use crate::error::ConfigError;
use crate::warp::{AffineModel, AffineWarpField, Interpolation};
use log::info;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Sample point in warp-grid-cell coordinates, tagged with its set index.
type Sample = ([f64; 2], usize);

/// One fitted model plus the points that produced it.
#[derive(Clone, Debug, Serialize)]
pub struct ConsensusSet {
    pub model: AffineModel,
    pub points: Vec<[f64; 2]>,
}

/// Builds an [`AffineWarpField`] of arbitrary resolution from consensus
/// match point sets.
///
/// Each grid cell is assigned to the consensus set whose sample points lie
/// nearest the cell center, giving a discrete Voronoi partition of the grid
/// among the sets. [`Self::to_index_grid_string`] renders that partition as
/// an ASCII diagram for debugging. Ties between equidistant samples resolve
/// in the spatial index's internal order, which is deterministic for a fixed
/// set of inserted points but otherwise unspecified.
#[derive(Debug)]
pub struct ConsensusWarpFieldBuilder {
    width: f64,
    height: f64,
    row_count: usize,
    column_count: usize,
    pixels_per_row: f64,
    pixels_per_column: f64,
    sets: Vec<ConsensusSet>,
    samples: Vec<Sample>,
}

impl ConsensusWarpFieldBuilder {
    /// Sets up a builder for a field with the given pixel dimensions and
    /// grid resolution.
    pub fn new(width: f64, height: f64, row_count: usize, column_count: usize) -> Self {
        assert!(row_count > 0 && column_count > 0, "warp grid needs at least one cell");
        Self {
            width,
            height,
            row_count,
            column_count,
            pixels_per_row: height / row_count as f64,
            pixels_per_column: width / column_count as f64,
            sets: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.row_count * self.column_count
    }

    pub fn consensus_set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn consensus_sets(&self) -> &[ConsensusSet] {
        &self.sets
    }

    /// Registers a consensus set: the model takes the next index in
    /// insertion order and every point is added to the sample index in
    /// grid-cell coordinates.
    pub fn add_consensus_set_data(&mut self, model: AffineModel, points: &[[f64; 2]]) {
        let index = self.sets.len();
        for point in points {
            let x = point[0] / self.pixels_per_column;
            let y = point[1] / self.pixels_per_row;
            self.samples.push(([x, y], index));
        }
        self.sets.push(ConsensusSet {
            model,
            points: points.to_vec(),
        });
    }

    /// Assigns every grid cell the set index of its nearest sample point:
    /// a discrete Voronoi partition of the grid, row-major.
    pub fn build_model_index_grid(&self) -> Result<Vec<usize>, ConfigError> {
        if self.samples.is_empty() {
            return Err(ConfigError::NoConsensusSets);
        }

        let tree = RTree::bulk_load(
            self.samples
                .iter()
                .map(|(point, index)| GeomWithData::new(*point, *index))
                .collect(),
        );

        let mut grid = Vec::with_capacity(self.cell_count());
        for row in 0..self.row_count {
            for column in 0..self.column_count {
                let center = [column as f64 + 0.5, row as f64 + 0.5];
                let index = tree
                    .nearest_neighbor(&center)
                    .map(|sample| sample.data)
                    .unwrap_or(0);
                grid.push(index);
            }
        }
        Ok(grid)
    }

    /// Number of distinct sets still owning at least one cell after
    /// nearest-neighbor resolution.
    pub fn distinct_set_count_in_grid(&self) -> Result<usize, ConfigError> {
        Ok(count_distinct(&self.build_model_index_grid()?))
    }

    /// Materializes the warp field: each cell receives the six affine
    /// coefficients of the consensus set owning it.
    pub fn build(&self, interpolation: Interpolation) -> Result<AffineWarpField, ConfigError> {
        let grid = self.build_model_index_grid()?;
        let mut field = AffineWarpField::new(
            self.width,
            self.height,
            self.row_count,
            self.column_count,
            interpolation,
        );
        for row in 0..self.row_count {
            for column in 0..self.column_count {
                let set_index = grid[row * self.column_count + column];
                field.set(row, column, self.sets[set_index].model.coefficients());
            }
        }
        Ok(field)
    }

    /// ASCII Voronoi diagram of the set indexes for each grid cell.
    pub fn to_index_grid_string(&self) -> Result<String, ConfigError> {
        let grid = self.build_model_index_grid()?;
        let field_width = digits(self.sets.len().saturating_sub(1)) + 1;

        let mut out = String::new();
        out.push_str(&format!(
            "{}x{} grid with {} distinct sets:\n",
            self.row_count,
            self.column_count,
            count_distinct(&grid)
        ));
        for (i, index) in grid.iter().enumerate() {
            if i % self.column_count == 0 {
                out.push('\n');
            }
            out.push_str(&format!("{:>width$}", index, width = field_width));
        }
        Ok(out)
    }

    /// Merges two independently built fields into the finer partition that
    /// is the logical AND of both Voronoi partitions.
    ///
    /// Every cell forms a composite key from its set index in each input;
    /// one fresh consensus set is created per distinct key (in grid order),
    /// seeded with an unconstrained model and the union of both builders'
    /// sample points falling in that key's cells. Boundaries present in
    /// either input survive into the merged partition.
    pub fn merge_builders(&self, other: &Self) -> Result<Self, ConfigError> {
        check_consistent("rowCount", self.row_count, other.row_count)?;
        check_consistent("columnCount", self.column_count, other.column_count)?;
        check_consistent("width", self.width, other.width)?;
        check_consistent("height", self.height, other.height)?;

        let mut cell_points: Vec<Vec<[f64; 2]>> = vec![Vec::new(); self.cell_count()];
        self.bucket_samples_by_cell(&mut cell_points);
        other.bucket_samples_by_cell(&mut cell_points);

        let grid = self.build_model_index_grid()?;
        let other_grid = other.build_model_index_grid()?;

        info!(
            "merge_builders: mapped {} samples onto a {}x{} grid",
            self.samples.len() + other.samples.len(),
            self.row_count,
            self.column_count
        );

        let mut key_order: Vec<(usize, usize)> = Vec::new();
        let mut grouped: HashMap<(usize, usize), Vec<[f64; 2]>> = HashMap::new();
        for (cell, points) in cell_points.into_iter().enumerate() {
            let key = (grid[cell], other_grid[cell]);
            let group = grouped.entry(key).or_insert_with(|| {
                key_order.push(key);
                Vec::new()
            });
            group.extend(points);
        }

        info!("merge_builders: merged result contains {} consensus sets", key_order.len());

        let mut merged = Self::new(self.width, self.height, self.row_count, self.column_count);
        for key in key_order {
            let points = grouped.remove(&key).unwrap_or_default();
            merged.add_consensus_set_data(AffineModel::identity(), &points);
        }
        Ok(merged)
    }

    /// Recovers each sample's full-scale position and appends it to the
    /// bucket of the grid cell it falls into.
    fn bucket_samples_by_cell(&self, cell_points: &mut [Vec<[f64; 2]>]) {
        for (point, _) in &self.samples {
            let x = point[0] * self.pixels_per_column;
            let y = point[1] * self.pixels_per_row;
            let row = (((y / self.height) * self.row_count as f64) as usize).min(self.row_count - 1);
            let column =
                (((x / self.width) * self.column_count as f64) as usize).min(self.column_count - 1);
            cell_points[row * self.column_count + column].push([x, y]);
        }
    }
}

fn check_consistent<T: PartialEq + std::fmt::Display>(
    context: &'static str,
    expected: T,
    actual: T,
) -> Result<(), ConfigError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConfigError::Inconsistent {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

fn count_distinct(grid: &[usize]) -> usize {
    grid.iter().collect::<HashSet<_>>().len()
}

fn digits(value: usize) -> usize {
    value.to_string().len()
}
