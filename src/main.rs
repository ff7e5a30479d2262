use tier_align::types::Bounds;
use tier_align::{plan_tier, RegionId};

fn main() {
    // Demo stub: plans one tier over a synthetic mosaic extent
    let rough = RegionId::new("demoOwner", "demoProject", "roughTiles");
    let bounds = Bounds::new(0.0, 0.0, 14585.0, 18542.0);

    let cells = plan_tier(&rough, &bounds, 4096, 1).expect("tier plan");
    println!(
        "tier 1: {} cells, grid {}x{}, scale {:.6}",
        cells.len(),
        cells[0].total_rows(),
        cells[0].total_columns(),
        cells[0].scale()
    );
    for cell in &cells {
        let b = cell.full_scale_bounds();
        println!(
            "  {} ({:.0},{:.0})..({:.0},{:.0})",
            cell.split_region_id().name,
            b.min_x,
            b.min_y,
            b.max_x,
            b.max_y
        );
    }
}
