use crate::region::RegionId;
use crate::types::Bounds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One grid cell of one tier.
///
/// Created in batch by the planner, then progressively enriched as the
/// pipeline runs: the MATCH stage persists the saved match pair count and the
/// ALIGN stage persists the alignment quality. The whole cell round-trips
/// through the region store as an opaque blob so a later run can resume from
/// whatever was already computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierCell {
    rough_region: RegionId,
    tier: u32,
    row: u32,
    column: u32,
    total_rows: u32,
    total_columns: u32,
    scale: f64,
    full_scale_bounds: Bounds,
    saved_match_pair_count: Option<u64>,
    alignment_quality: Option<f64>,
}

impl TierCell {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rough_region: RegionId,
        tier: u32,
        row: u32,
        column: u32,
        total_rows: u32,
        total_columns: u32,
        scale: f64,
        full_scale_bounds: Bounds,
    ) -> Self {
        debug_assert!(row < total_rows && column < total_columns);
        Self {
            rough_region,
            tier,
            row,
            column,
            total_rows,
            total_columns,
            scale,
            full_scale_bounds,
            saved_match_pair_count: None,
            alignment_quality: None,
        }
    }

    pub fn tier(&self) -> u32 {
        self.tier
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn total_rows(&self) -> u32 {
        self.total_rows
    }

    pub fn total_columns(&self) -> u32 {
        self.total_columns
    }

    /// Render scale applied to this cell's canvases, always in `(0, 1]`.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn full_scale_bounds(&self) -> &Bounds {
        &self.full_scale_bounds
    }

    pub fn rough_region(&self) -> &RegionId {
        &self.rough_region
    }

    /// Region this cell's canvases are rendered from.
    pub fn parent_region_id(&self) -> RegionId {
        RegionId::parent_for_tier(&self.rough_region, self.tier)
    }

    /// Warped output region of this cell's tier.
    pub fn warp_region_id(&self) -> RegionId {
        RegionId::warp_for_tier(&self.rough_region, self.tier)
    }

    /// Split region holding this cell's scaled canvases.
    pub fn split_region_id(&self) -> RegionId {
        RegionId::split_cell(
            &self.rough_region,
            self.tier,
            self.row,
            self.column,
            self.total_rows,
            self.total_columns,
        )
    }

    /// Region the solver writes this cell's fitted results into.
    pub fn aligned_region_id(&self) -> RegionId {
        let split = self.split_region_id();
        RegionId::new(split.owner, split.project, format!("{}_align", split.name))
    }

    /// Match collection receiving this cell's point correspondences.
    pub fn match_collection(&self) -> String {
        let split = self.split_region_id();
        format!("{}_{}", split.project, split.name)
    }

    /// Canvas tile id for one layer of this cell.
    pub fn tile_id_for_layer(&self, layer: f64) -> String {
        format!("{}.{}", self.split_region_id().name, layer)
    }

    pub fn saved_match_pair_count(&self) -> Option<u64> {
        self.saved_match_pair_count
    }

    pub fn set_saved_match_pair_count(&mut self, count: Option<u64>) {
        self.saved_match_pair_count = count;
    }

    pub fn alignment_quality(&self) -> Option<f64> {
        self.alignment_quality
    }

    pub fn set_alignment_quality(&mut self, quality: Option<f64>) {
        self.alignment_quality = quality;
    }

    /// True when no match pair count has been persisted yet.
    pub fn requires_match_derivation(&self) -> bool {
        self.saved_match_pair_count.is_none()
    }

    /// True when matching found at least one pair.
    pub fn has_match_pairs(&self) -> bool {
        self.saved_match_pair_count.is_some_and(|count| count > 0)
    }

    /// True when no alignment quality has been persisted yet.
    pub fn requires_alignment(&self) -> bool {
        self.alignment_quality.is_none()
    }

    /// Copies persisted progress from a previously stored cell of the same
    /// identity, so a keep-existing run resumes instead of recomputing.
    pub fn carry_forward(&mut self, stored: &TierCell) {
        self.saved_match_pair_count = stored.saved_match_pair_count;
        self.alignment_quality = stored.alignment_quality;
    }
}

impl fmt::Display for TierCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tier {} cell ({}, {}) of {}x{}",
            self.tier, self.row, self.column, self.total_rows, self.total_columns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> TierCell {
        TierCell::new(
            RegionId::new("testOwner", "tilesProject", "roughTiles"),
            2,
            1,
            2,
            3,
            3,
            0.1,
            Bounds::new(22.0, 33.0, 44.0, 55.0),
        )
    }

    #[test]
    fn derived_identities() {
        let cell = cell();
        assert_eq!(cell.parent_region_id().name, "roughTiles_tier_1_warp");
        assert_eq!(cell.warp_region_id().name, "roughTiles_tier_2_warp");

        let split = cell.split_region_id();
        assert_eq!(split.project, "tilesProject_roughTiles_tier_2");
        assert_eq!(split.name, "0003x0003_000005");

        assert_eq!(cell.aligned_region_id().name, "0003x0003_000005_align");
        assert_eq!(
            cell.match_collection(),
            "tilesProject_roughTiles_tier_2_0003x0003_000005"
        );
        assert_eq!(cell.tile_id_for_layer(7.0), "0003x0003_000005.7");
    }

    #[test]
    fn progress_predicates() {
        let mut cell = cell();
        assert!(cell.requires_match_derivation());
        assert!(!cell.has_match_pairs());
        assert!(cell.requires_alignment());

        cell.set_saved_match_pair_count(Some(0));
        assert!(!cell.requires_match_derivation());
        assert!(!cell.has_match_pairs());

        cell.set_saved_match_pair_count(Some(22));
        assert!(cell.has_match_pairs());

        cell.set_alignment_quality(Some(66.0));
        assert!(!cell.requires_alignment());
    }

    #[test]
    fn carry_forward_copies_persisted_progress() {
        let mut stored = cell();
        stored.set_saved_match_pair_count(Some(17));
        stored.set_alignment_quality(Some(0.8));

        let mut fresh = cell();
        fresh.carry_forward(&stored);
        assert_eq!(fresh.saved_match_pair_count(), Some(17));
        assert_eq!(fresh.alignment_quality(), Some(0.8));
    }

    #[test]
    fn cell_round_trips_through_json() {
        let mut cell = cell();
        cell.set_saved_match_pair_count(Some(5));
        let json = serde_json::to_string(&cell).expect("serialize");
        let back: TierCell = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cell);
    }
}
