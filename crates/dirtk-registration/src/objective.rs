//! Weighted registration objective.
//!
//! The objective samples the transformation's displacement on a target
//! domain, evaluates every energy term on it, sums the weighted voxel
//! gradients and pulls the sum back to transformation parameters with a
//! single adjoint pass.

use dirtk_core::gradient::GradientOptions;
use dirtk_core::{AdjointGradientEngine, GradientImage, ImageDomain, SpatialTransform, VectorImage};
use tracing::debug;

use crate::energy::EnergyTerm;
use crate::error::{RegistrationError, Result};
use crate::validation::{validate_domain, validate_finite, validate_weight};

/// Objective value and parameter gradient for one transformation state.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Weighted sum of term energies.
    pub value: f64,
    /// `∂value/∂θ`, one entry per transformation DOF.
    pub gradient: Vec<f64>,
    /// Unweighted energy of each term, in insertion order.
    pub terms: Vec<(String, f64)>,
}

/// Weighted energy terms over one target domain.
pub struct Objective {
    domain: ImageDomain,
    terms: Vec<Box<dyn EnergyTerm>>,
    t0: f64,
    t1: f64,
    options: GradientOptions,
}

impl Objective {
    /// Objective over `domain` for the unit interval `[0, 1]`.
    pub fn new(domain: ImageDomain) -> Self {
        Self {
            domain,
            terms: Vec::new(),
            t0: 0.0,
            t1: 1.0,
            options: GradientOptions::default(),
        }
    }

    /// Integration interval of the transformation.
    pub fn with_interval(mut self, t0: f64, t1: f64) -> Self {
        self.t0 = t0;
        self.t1 = t1;
        self
    }

    pub fn with_options(mut self, options: GradientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_term(mut self, term: impl EnergyTerm + 'static) -> Result<Self> {
        self.add_term(Box::new(term))?;
        Ok(self)
    }

    pub fn add_term(&mut self, term: Box<dyn EnergyTerm>) -> Result<()> {
        validate_weight(term.weight())?;
        self.terms.push(term);
        Ok(())
    }

    pub fn domain(&self) -> &ImageDomain {
        &self.domain
    }

    pub fn terms(&self) -> &[Box<dyn EnergyTerm>] {
        &self.terms
    }

    pub fn interval(&self) -> (f64, f64) {
        (self.t0, self.t1)
    }

    /// Weighted objective value without a gradient.
    pub fn value<T: SpatialTransform + ?Sized>(&self, transform: &T) -> Result<f64> {
        let displacement = transform.displacement(&self.domain, self.t0, self.t1)?;
        validate_finite(&displacement, "displacement")?;
        let mut value = 0.0;
        for term in &self.terms {
            value += term.weight() * self.term_value(term.as_ref(), &displacement)?;
        }
        Ok(value)
    }

    /// Objective value and gradient with respect to every DOF of `transform`.
    pub fn evaluate<T: SpatialTransform + ?Sized>(&self, transform: &T) -> Result<Evaluation> {
        if self.terms.is_empty() {
            return Err(RegistrationError::invalid_configuration("objective has no energy terms"));
        }
        let displacement = transform.displacement(&self.domain, self.t0, self.t1)?;
        validate_finite(&displacement, "displacement")?;

        let mut value = 0.0;
        let mut terms = Vec::with_capacity(self.terms.len());
        let mut combined = VectorImage::zeros(self.domain.clone());
        for term in &self.terms {
            let energy = self.term_value(term.as_ref(), &displacement)?;
            debug!(term = term.name(), energy, weight = term.weight(), "energy term");
            value += term.weight() * energy;
            terms.push((term.name().to_string(), energy));
            if term.weight() == 0.0 {
                continue;
            }
            let gradient = term.non_parametric_gradient(&displacement)?;
            self.check_gradient(term.as_ref(), &gradient)?;
            for (acc, g) in combined.data_mut().iter_mut().zip(gradient.data()) {
                *acc += g * term.weight();
            }
        }

        let mut gradient = vec![0.0; transform.num_dofs()];
        AdjointGradientEngine::new(transform)
            .with_options(self.options)
            .parametric_gradient(&combined, &mut gradient, 1.0, self.t0, self.t1)?;
        Ok(Evaluation { value, gradient, terms })
    }

    fn term_value(&self, term: &dyn EnergyTerm, displacement: &VectorImage) -> Result<f64> {
        let energy = term.evaluate(displacement)?;
        if !energy.is_finite() {
            return Err(RegistrationError::numerical_instability(format!(
                "{} produced a non-finite energy",
                term.name()
            )));
        }
        Ok(energy)
    }

    fn check_gradient(&self, term: &dyn EnergyTerm, gradient: &GradientImage) -> Result<()> {
        validate_domain(&self.domain, gradient.domain())?;
        validate_finite(gradient, term.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::DisplacementMse;
    use dirtk_core::{ControlLattice, Point3, Svffd, Vector3};

    fn domain() -> ImageDomain {
        ImageDomain::axis_aligned([3, 3, 3], Point3::origin(), Vector3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_empty_objective_is_rejected() {
        let svffd = Svffd::new(ControlLattice::covering(&domain(), 1.0).unwrap()).unwrap();
        assert!(Objective::new(domain()).evaluate(&svffd).is_err());
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let term = DisplacementMse::new(VectorImage::zeros(domain())).unwrap().with_weight(-1.0);
        assert!(Objective::new(domain()).with_term(term).is_err());
    }

    #[test]
    fn test_identity_matches_target() {
        let svffd = Svffd::new(ControlLattice::covering(&domain(), 1.0).unwrap()).unwrap();
        let objective = Objective::new(domain())
            .with_term(DisplacementMse::new(VectorImage::zeros(domain())).unwrap())
            .unwrap();
        let evaluation = objective.evaluate(&svffd).unwrap();
        assert_eq!(evaluation.value, 0.0);
        assert!(evaluation.gradient.iter().all(|g| *g == 0.0));
        assert_eq!(evaluation.terms, vec![("DisplacementMse".to_string(), 0.0)]);
    }

    #[test]
    fn test_term_on_other_domain_is_rejected() {
        let other = ImageDomain::axis_aligned([2, 2, 2], Point3::origin(), Vector3::repeat(1.0)).unwrap();
        let svffd = Svffd::new(ControlLattice::covering(&domain(), 1.0).unwrap()).unwrap();
        let objective = Objective::new(domain())
            .with_term(DisplacementMse::new(VectorImage::zeros(other)).unwrap())
            .unwrap();
        assert!(matches!(
            objective.evaluate(&svffd),
            Err(RegistrationError::ShapeMismatch { .. })
        ));
    }
}
