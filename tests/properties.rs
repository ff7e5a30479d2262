use proptest::prelude::*;
use tier_align::region::RegionId;
use tier_align::tier::plan_tier;
use tier_align::types::Bounds;
use tier_align::warp::{AffineModel, ConsensusWarpFieldBuilder};

proptest! {
    /// The planned cells tile the parent exactly: shared edges between
    /// neighbours, outer edges on the parent boundary, square grid, and a
    /// render scale inside (0, 1].
    #[test]
    fn planner_tiles_the_parent_exactly(
        min_x in -1.0e5..1.0e5f64,
        min_y in -1.0e5..1.0e5f64,
        width in 1.0e3..5.0e4f64,
        height in 1.0e3..5.0e4f64,
        budget in 1024u32..8192,
    ) {
        let rough = RegionId::new("o", "p", "rough");
        let parent = Bounds::new(min_x, min_y, min_x + width, min_y + height);
        let cells = plan_tier(&rough, &parent, budget, 1).unwrap();

        prop_assert!(!cells.is_empty());
        let n = cells[0].total_rows() as usize;
        prop_assert_eq!(cells[0].total_columns() as usize, n);
        prop_assert_eq!(cells.len(), n * n);

        for cell in &cells {
            prop_assert!(cell.scale() > 0.0 && cell.scale() <= 1.0);
            let b = cell.full_scale_bounds();
            prop_assert!(b.min_x < b.max_x && b.min_y < b.max_y);
        }

        for row in 0..n {
            for col in 0..n {
                let b = cells[row * n + col].full_scale_bounds();
                if col == 0 {
                    prop_assert_eq!(b.min_x, parent.min_x);
                } else {
                    prop_assert_eq!(b.min_x, cells[row * n + col - 1].full_scale_bounds().max_x);
                }
                if col == n - 1 {
                    prop_assert_eq!(b.max_x, parent.max_x);
                }
                if row == 0 {
                    prop_assert_eq!(b.min_y, parent.min_y);
                } else {
                    prop_assert_eq!(b.min_y, cells[(row - 1) * n + col].full_scale_bounds().max_y);
                }
                if row == n - 1 {
                    prop_assert_eq!(b.max_y, parent.max_y);
                }
            }
        }
    }

    /// Every grid cell is assigned *some* nearest sample: the assigned set's
    /// closest sample is exactly as close as the globally closest sample.
    /// Which of several equidistant samples wins is implementation-defined.
    #[test]
    fn nearest_neighbor_assignment_is_valid(
        points in prop::collection::vec((0.0..100.0f64, 0.0..100.0f64), 1..16),
    ) {
        let mut builder = ConsensusWarpFieldBuilder::new(100.0, 100.0, 8, 8);
        for &(x, y) in &points {
            builder.add_consensus_set_data(AffineModel::identity(), &[[x, y]]);
        }

        let grid = builder.build_model_index_grid().unwrap();
        let cell_size = 100.0 / 8.0;
        let samples: Vec<[f64; 2]> = points
            .iter()
            .map(|&(x, y)| [x / cell_size, y / cell_size])
            .collect();

        for row in 0..8 {
            for col in 0..8 {
                let center = [col as f64 + 0.5, row as f64 + 0.5];
                let squared = |p: &[f64; 2]| {
                    (p[0] - center[0]).powi(2) + (p[1] - center[1]).powi(2)
                };
                let best = samples.iter().map(squared).fold(f64::INFINITY, f64::min);
                let assigned = grid[row * 8 + col];
                prop_assert!(
                    (squared(&samples[assigned]) - best).abs() < 1e-9,
                    "cell ({}, {}) assigned set {} at distance {}, nearest is {}",
                    row, col, assigned, squared(&samples[assigned]), best
                );
            }
        }
    }
}
