//! Prints the tier plan a configuration would produce, without touching any
//! service: grid shape, scale, per-cell bounds and derived identities.

use std::env;
use std::path::PathBuf;
use tier_align::config::load_config;
use tier_align::region::RegionId;
use tier_align::tier::plan_tier;
use tier_align::types::Bounds;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let config_path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| "usage: tier_plan <config.json> [width height]".to_string())?;
    let config = load_config(&config_path)?;

    // the region store is not reachable here, so the parent extent comes
    // from the command line (defaults to the reference mosaic size)
    let width: f64 = parse_or(args.next(), 14585.0)?;
    let height: f64 = parse_or(args.next(), 18542.0)?;
    let bounds = Bounds::new(0.0, 0.0, width, height);

    let rough = config.rough_region();
    for tier in config.first_tier..=config.last_tier {
        let parent = RegionId::parent_for_tier(&rough, tier);
        let cells = plan_tier(&rough, &bounds, config.max_pixels_per_dimension, tier)
            .map_err(|e| e.to_string())?;

        println!(
            "tier {tier}: parent {parent}, {} cells at scale {:.6}",
            cells.len(),
            cells[0].scale()
        );
        for cell in &cells {
            let b = cell.full_scale_bounds();
            println!(
                "  {} ({:.0},{:.0})..({:.0},{:.0}) matches->{}",
                cell.split_region_id().name,
                b.min_x,
                b.min_y,
                b.max_x,
                b.max_y,
                cell.match_collection()
            );
        }
    }
    Ok(())
}

fn parse_or(arg: Option<String>, default: f64) -> Result<f64, String> {
    match arg {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|e| format!("invalid dimension {raw}: {e}")),
        None => Ok(default),
    }
}
