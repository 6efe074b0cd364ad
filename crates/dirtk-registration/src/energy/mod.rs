//! Energy terms over dense displacement fields.

pub mod trait_;
pub mod mse;
pub mod diffusion;

pub use trait_::EnergyTerm;
pub use mse::DisplacementMse;
pub use diffusion::DiffusionEnergy;
