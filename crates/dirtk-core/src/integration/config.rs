//! Integration settings shared by all velocity-based transformations.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Explicit one-step scheme used for each integration substep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    /// Forward Euler, one velocity evaluation per substep.
    #[default]
    Euler,
    /// Classical fourth-order Runge-Kutta.
    RungeKutta4,
}

impl IntegrationScheme {
    /// Stage coupling `a_i`, nodes `c_i` and weights `b_i` of the tableau.
    /// Both schemes only couple each stage to its predecessor.
    pub(crate) fn tableau(self) -> (&'static [f64], &'static [f64], &'static [f64]) {
        match self {
            Self::Euler => (&[0.0], &[0.0], &[1.0]),
            Self::RungeKutta4 => (
                &[0.0, 0.5, 0.5, 1.0],
                &[0.0, 0.5, 0.5, 1.0],
                &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
            ),
        }
    }

    pub fn num_stages(self) -> usize {
        match self {
            Self::Euler => 1,
            Self::RungeKutta4 => 4,
        }
    }
}

/// How cached domain displacements are computed.
///
/// Point queries and gradients always follow the pointwise map. Dense
/// squaring agrees with it up to the trilinear resampling error of each
/// squaring, roughly `N * h² / 8 * max|∂²d|` for voxel spacing `h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplacementMethod {
    /// Every voxel is exponentiated on its own; matches point queries exactly.
    #[default]
    Pointwise,
    /// One substep per voxel, then `N` grid squarings. Non-stationary
    /// fields fall back to [`DisplacementMethod::Pointwise`].
    DenseSquaring,
}

/// Configuration for velocity field exponentiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// One-step scheme for each substep
    pub scheme: IntegrationScheme,
    /// Largest displacement of one substep, as a fraction of the cell size
    pub max_substep: f64,
    /// Lower bound on the number of squarings
    pub min_squarings: u32,
    /// Upper bound on the number of squarings
    pub max_squarings: u32,
    /// Residual (mm) at which the inverse search stops
    pub inverse_tolerance: f64,
    /// Newton iterations allowed for the inverse search
    pub inverse_max_iterations: usize,
    /// Method behind cached domain displacements
    #[serde(default)]
    pub displacement: DisplacementMethod,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::Euler,
            max_substep: 0.5,
            min_squarings: 5,
            max_squarings: 16,
            inverse_tolerance: 1e-10,
            inverse_max_iterations: 30,
            displacement: DisplacementMethod::Pointwise,
        }
    }
}

impl IntegrationConfig {
    pub fn new(scheme: IntegrationScheme) -> Self {
        Self {
            scheme,
            ..Default::default()
        }
    }

    pub fn with_scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_max_substep(mut self, max_substep: f64) -> Self {
        self.max_substep = max_substep;
        self
    }

    /// Set both bounds on the number of squarings
    pub fn with_squarings(mut self, min: u32, max: u32) -> Self {
        self.min_squarings = min;
        self.max_squarings = max;
        self
    }

    pub fn with_inverse(mut self, tolerance: f64, max_iterations: usize) -> Self {
        self.inverse_tolerance = tolerance;
        self.inverse_max_iterations = max_iterations;
        self
    }

    pub fn with_displacement(mut self, displacement: DisplacementMethod) -> Self {
        self.displacement = displacement;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.max_substep > 0.0 && self.max_substep <= 1.0) {
            return Err(TransformError::configuration(format!(
                "max_substep must be in (0, 1], got {}",
                self.max_substep
            )));
        }
        if self.min_squarings > self.max_squarings {
            return Err(TransformError::configuration(format!(
                "min_squarings ({}) exceeds max_squarings ({})",
                self.min_squarings, self.max_squarings
            )));
        }
        // 2^N substeps are run per point; keep the count addressable.
        if self.max_squarings > 30 {
            return Err(TransformError::configuration(format!(
                "max_squarings must not exceed 30, got {}",
                self.max_squarings
            )));
        }
        if !(self.inverse_tolerance > 0.0) {
            return Err(TransformError::configuration("inverse_tolerance must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IntegrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheme, IntegrationScheme::Euler);
        assert_eq!(config.max_substep, 0.5);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(IntegrationConfig::default().with_max_substep(0.0).validate().is_err());
        assert!(IntegrationConfig::default().with_squarings(8, 4).validate().is_err());
        assert!(IntegrationConfig::default().with_squarings(0, 40).validate().is_err());
    }

    #[test]
    fn test_tableau_weights_sum_to_one() {
        for scheme in [IntegrationScheme::Euler, IntegrationScheme::RungeKutta4] {
            let (a, c, b) = scheme.tableau();
            assert_eq!(a.len(), scheme.num_stages());
            assert_eq!(c.len(), scheme.num_stages());
            assert!((b.iter().sum::<f64>() - 1.0).abs() < 1e-15);
        }
    }
}
