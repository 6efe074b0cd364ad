//! Squared distance to a target displacement.

use dirtk_core::{DisplacementField, GradientImage, VectorImage};
use rayon::prelude::*;

use super::trait_::EnergyTerm;
use crate::error::Result;
use crate::validation::{validate_domain, validate_finite};

/// `½ Σ_voxels ‖d(x) − d_target(x)‖²`.
#[derive(Debug, Clone)]
pub struct DisplacementMse {
    target: DisplacementField,
    weight: f64,
}

impl DisplacementMse {
    pub fn new(target: DisplacementField) -> Result<Self> {
        validate_finite(&target, "target displacement")?;
        Ok(Self { target, weight: 1.0 })
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn target(&self) -> &DisplacementField {
        &self.target
    }
}

impl EnergyTerm for DisplacementMse {
    fn name(&self) -> &str {
        "DisplacementMse"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn evaluate(&self, displacement: &DisplacementField) -> Result<f64> {
        validate_domain(self.target.domain(), displacement.domain())?;
        Ok(displacement
            .data()
            .par_iter()
            .zip(self.target.data().par_iter())
            .map(|(d, t)| 0.5 * (d - t).norm_squared())
            .sum())
    }

    fn non_parametric_gradient(&self, displacement: &DisplacementField) -> Result<GradientImage> {
        validate_domain(self.target.domain(), displacement.domain())?;
        let residual = displacement
            .data()
            .par_iter()
            .zip(self.target.data().par_iter())
            .map(|(d, t)| d - t)
            .collect();
        Ok(VectorImage::new(displacement.domain().clone(), residual)?)
    }
}
