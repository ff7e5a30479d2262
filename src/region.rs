//! Region identities and the deterministic naming scheme tying tiers together.
//!
//! Every piece of persisted data in the pipeline lives in a named region:
//! the rough source mosaic, the per-cell split regions of each tier, the
//! per-cell aligned results, and the warped per-tier output. All of those
//! names are pure functions of the rough region's identity plus tier/row/
//! column, so any stage can re-derive them without shared state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one named region: owner, project namespace, and region name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId {
    pub owner: String,
    pub project: String,
    pub name: String,
}

impl RegionId {
    pub fn new(
        owner: impl Into<String>,
        project: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
            name: name.into(),
        }
    }

    /// Project namespace holding all split-cell regions of one tier.
    pub fn project_for_tier(rough: &RegionId, tier: u32) -> String {
        format!("{}_{}_tier_{}", rough.project, rough.name, tier)
    }

    /// Region a tier is aligned against: the rough region for tier 1,
    /// otherwise the previous tier's warped output.
    pub fn parent_for_tier(rough: &RegionId, tier: u32) -> RegionId {
        if tier <= 1 {
            rough.clone()
        } else {
            Self::warp_for_tier(rough, tier - 1)
        }
    }

    /// Warped output region written by a tier's WARP stage.
    pub fn warp_for_tier(rough: &RegionId, tier: u32) -> RegionId {
        RegionId::new(
            rough.owner.clone(),
            rough.project.clone(),
            format!("{}_tier_{}_warp", rough.name, tier),
        )
    }

    /// Split-cell region for one grid cell of one tier. The name encodes the
    /// grid shape and the cell's row-major index so regions sort spatially.
    pub fn split_cell(
        rough: &RegionId,
        tier: u32,
        row: u32,
        column: u32,
        total_rows: u32,
        total_columns: u32,
    ) -> RegionId {
        let index = row * total_columns + column;
        RegionId::new(
            rough.owner.clone(),
            Self::project_for_tier(rough, tier),
            format!("{:04}x{:04}_{:06}", total_rows, total_columns, index),
        )
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.owner, self.project, self.name)
    }
}
