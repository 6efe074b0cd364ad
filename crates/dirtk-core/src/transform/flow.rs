//! Mapping, inversion and differentiation of points carried by a velocity
//! field. Shared by every velocity-parameterized transformation.

use super::trait_::PointGradient;
use crate::error::Result;
use crate::image::{DisplacementField, ImageDomain};
use crate::integration::{
    exponentiate_dense, newton_inverse, DisplacementMethod, IntegrationConfig, IntegrationPlan, Integrator, Inversion,
    Trajectory, VelocityField,
};
use crate::spatial::{Point3, Vector3};

pub(crate) fn flow_transform<F>(field: &F, config: &IntegrationConfig, p: &Point3, t0: f64, t1: f64) -> Result<Point3>
where
    F: VelocityField + ?Sized,
{
    let integrator = Integrator::new(field, config);
    let plan = integrator.plan_for_point(p, t0, t1)?;
    integrator.integrate(p, &plan)
}

/// Newton search on the forward map, started from the backward flow.
pub(crate) fn flow_inverse<F>(field: &F, config: &IntegrationConfig, p: &Point3, t0: f64, t1: f64) -> Result<Inversion>
where
    F: VelocityField + ?Sized,
{
    let integrator = Integrator::new(field, config);
    let plan = integrator.plan_for_point(p, t0, t1)?;
    if plan.is_identity() {
        return Ok(Inversion::exact(*p));
    }
    let guess = integrator.integrate(p, &plan.reversed())?;
    newton_inverse(p, guess, config.inverse_tolerance, config.inverse_max_iterations, |x| {
        integrator.integrate_with_jacobian(x, &plan)
    })
}

/// Domain displacement by the method the configuration selects.
pub(crate) fn flow_displacement<F>(
    field: &F,
    config: &IntegrationConfig,
    domain: &ImageDomain,
    t0: f64,
    t1: f64,
) -> Result<DisplacementField>
where
    F: VelocityField + ?Sized,
{
    if config.displacement == DisplacementMethod::DenseSquaring && field.is_stationary() {
        return exponentiate_dense(field, config, domain, t0, t1);
    }
    let integrator = Integrator::new(field, config);
    let plan = integrator.plan_for_domain(domain, t0, t1)?;
    integrator.displacement(domain, &plan)
}

/// Adjoint chain rule through the integration of single points.
pub(crate) struct FlowGradient<'a, F> {
    field: F,
    config: &'a IntegrationConfig,
    /// Fixed plan for domain sweeps; points plan individually otherwise.
    plan: Option<IntegrationPlan>,
    t0: f64,
    t1: f64,
}

impl<'a, F: VelocityField> FlowGradient<'a, F> {
    pub fn new(field: F, config: &'a IntegrationConfig, domain: Option<&ImageDomain>, t0: f64, t1: f64) -> Result<Self> {
        let plan = match domain {
            Some(domain) => Some(Integrator::new(&field, config).plan_for_domain(domain, t0, t1)?),
            None => None,
        };
        Ok(Self {
            field,
            config,
            plan,
            t0,
            t1,
        })
    }
}

impl<F: VelocityField> PointGradient for FlowGradient<'_, F> {
    fn accumulate(&self, p: &Point3, g: &Vector3, grad: &mut [f64], scratch: &mut Trajectory) -> Result<()> {
        let integrator = Integrator::new(&self.field, self.config);
        let plan = match self.plan {
            Some(plan) => plan,
            None => integrator.plan_for_point(p, self.t0, self.t1)?,
        };
        integrator.integrate_recording(p, &plan, scratch)?;
        scratch.adjoint(&self.field, g, grad);
        Ok(())
    }
}
