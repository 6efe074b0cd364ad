//! Velocity field exponentiation.
//!
//! [`Integrator`] maps single points through `exp((t1 - t0) v)` and records
//! trajectories for the adjoint pass; [`exponentiate_dense`] is the dense
//! grid variant.

pub mod config;
pub mod field;
pub mod integrator;
pub mod inverse;
pub mod squaring;
pub mod trajectory;

pub use config::{DisplacementMethod, IntegrationConfig, IntegrationScheme};
pub use field::VelocityField;
pub use integrator::{IntegrationPlan, Integrator};
pub use inverse::{newton_inverse, Inversion};
pub use squaring::exponentiate_dense;
pub use trajectory::{StageRecord, Trajectory};
