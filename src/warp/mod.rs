//! Warp-field synthesis from consensus match point sets.
//!
//! A warp field discretizes a smoothly varying deformation into a grid of
//! per-cell affine models. [`ConsensusWarpFieldBuilder`] assigns each grid
//! cell to the consensus set whose sample points lie nearest (a discrete
//! Voronoi partition), and can merge two independently built fields into the
//! finer partition that preserves every boundary of either input.

mod builder;
mod field;

pub use builder::{ConsensusSet, ConsensusWarpFieldBuilder};
pub use field::{AffineModel, AffineWarpField, Interpolation};
