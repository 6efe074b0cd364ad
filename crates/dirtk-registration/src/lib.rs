//! Registration objectives over dirtk transformations.
//!
//! Energy terms see only dense displacement fields; the [`Objective`]
//! combines them and converts their voxel gradients into parameter
//! gradients through the transformation's adjoint.

pub mod error;
pub mod validation;
pub mod energy;
pub mod objective;

pub use error::{RegistrationError, Result};
pub use energy::{DiffusionEnergy, DisplacementMse, EnergyTerm};
pub use objective::{Evaluation, Objective};
