use crate::error::ConfigError;
use crate::region::RegionId;
use crate::tier::TierCell;
use crate::types::Bounds;
use log::debug;

/// Upper bound on the tier grid's per-dimension cell count. Subdivision past
/// this point means the pixel budget is pathological for the parent extent.
pub const MAX_GRID_PER_DIMENSION: u32 = 4096;

/// Splits a parent region into the square grid of cells forming one tier.
///
/// Picks the smallest `N` such that every cell fits inside
/// `2 * max_pixels_per_dimension` in both axes, which bounds the downscale
/// applied to any cell to a factor of two while minimising the cell count.
/// Cell extents are the ceiling of the even split, and trailing cells are
/// clipped to the parent bounds, so the grid tiles the parent exactly.
///
/// Cells are returned in row-major order (row 0 first, columns left to
/// right). A valid input always yields at least one cell.
pub fn plan_tier(
    rough_region: &RegionId,
    parent_bounds: &Bounds,
    max_pixels_per_dimension: u32,
    tier: u32,
) -> Result<Vec<TierCell>, ConfigError> {
    if max_pixels_per_dimension == 0 {
        return Err(ConfigError::InvalidPixelBudget);
    }
    if !parent_bounds.is_valid() {
        return Err(ConfigError::DegenerateBounds {
            width: parent_bounds.width(),
            height: parent_bounds.height(),
        });
    }

    let width = parent_bounds.width();
    let height = parent_bounds.height();
    let budget = f64::from(max_pixels_per_dimension);

    let mut grid_size = 1u32;
    loop {
        let n = f64::from(grid_size);
        if (width / n).ceil() <= 2.0 * budget && (height / n).ceil() <= 2.0 * budget {
            break;
        }
        grid_size += 1;
        if grid_size > MAX_GRID_PER_DIMENSION {
            return Err(ConfigError::ExcessiveGrid {
                tier,
                cells: grid_size,
                limit: MAX_GRID_PER_DIMENSION,
            });
        }
    }

    let n = f64::from(grid_size);
    let cell_width = (width / n).ceil();
    let cell_height = (height / n).ceil();
    let scale = (budget / cell_width.max(cell_height)).min(1.0);

    let mut cells = Vec::with_capacity((grid_size * grid_size) as usize);
    for row in 0..grid_size {
        let min_y = parent_bounds.min_y + f64::from(row) * cell_height;
        // interior max edges reuse the next row/column's min-edge expression
        // so adjacent cells share one exact boundary value; the trailing
        // row/column is clipped onto the parent edge
        let max_y = if row + 1 == grid_size {
            parent_bounds.max_y
        } else {
            (parent_bounds.min_y + f64::from(row + 1) * cell_height).min(parent_bounds.max_y)
        };
        for column in 0..grid_size {
            let min_x = parent_bounds.min_x + f64::from(column) * cell_width;
            let max_x = if column + 1 == grid_size {
                parent_bounds.max_x
            } else {
                (parent_bounds.min_x + f64::from(column + 1) * cell_width).min(parent_bounds.max_x)
            };
            cells.push(TierCell::new(
                rough_region.clone(),
                tier,
                row,
                column,
                grid_size,
                grid_size,
                scale,
                Bounds::new(min_x, min_y, max_x, max_y),
            ));
        }
    }

    debug!(
        "plan_tier: tier={} grid={}x{} cell={}x{} scale={:.6}",
        tier, grid_size, grid_size, cell_width, cell_height, scale
    );

    Ok(cells)
}
