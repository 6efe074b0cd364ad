//! Image domains and dense vector images.
//!
//! Voxel intensities are owned by external collaborators; this module only
//! carries sampling grids and the vector-valued images exchanged with
//! energy terms.

pub mod domain;
pub mod field;
pub mod grid;

pub use domain::ImageDomain;
pub use field::{DisplacementField, GradientImage, VectorImage};
pub use grid::world_points_tensor;
