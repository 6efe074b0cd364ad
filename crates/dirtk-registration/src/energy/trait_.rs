//! Energy term contract.

use dirtk_core::{DisplacementField, GradientImage};

use crate::error::Result;

/// A registration energy expressed over a dense displacement field.
///
/// Terms report their unweighted value and the derivative of that value
/// with respect to the displacement at every voxel. The objective applies
/// [`EnergyTerm::weight`] and pulls the voxel gradient back to transformation
/// parameters.
pub trait EnergyTerm: Send + Sync {
    /// Identifier used in logs and evaluation reports.
    fn name(&self) -> &str;

    /// Weight of this term in the objective.
    fn weight(&self) -> f64;

    /// Set the weight of this term in the objective.
    fn set_weight(&mut self, weight: f64);

    /// Unweighted energy of `displacement`.
    fn evaluate(&self, displacement: &DisplacementField) -> Result<f64>;

    /// Unweighted `∂E/∂d` per voxel, on the domain of `displacement`.
    fn non_parametric_gradient(&self, displacement: &DisplacementField) -> Result<GradientImage>;
}
