//! Dense scaling and squaring on an image grid.
//!
//! A faster approximate alternative to pointwise exponentiation: one substep
//! is taken at every voxel, then the displacement field is squared `N` times
//! via `d <- d + d(x + d)`, resampling `d` trilinearly at each squaring.
//! Gradients are always computed against the pointwise map, never this one.

use rayon::prelude::*;
use tracing::debug;

use super::config::IntegrationConfig;
use super::field::VelocityField;
use super::integrator::Integrator;
use crate::error::{Result, TransformError};
use crate::image::{DisplacementField, ImageDomain};
use crate::spatial::{is_finite_vector, Point3, Vector3};

/// Exponentiate a stationary velocity field over `[t0, t1]` on `domain`.
pub fn exponentiate_dense<F>(
    field: &F,
    config: &IntegrationConfig,
    domain: &ImageDomain,
    t0: f64,
    t1: f64,
) -> Result<DisplacementField>
where
    F: VelocityField + ?Sized,
{
    if !field.is_stationary() {
        return Err(TransformError::configuration(
            "dense scaling and squaring requires a stationary velocity field",
        ));
    }
    let integrator = Integrator::new(field, config);
    let plan = integrator.plan_for_domain(domain, t0, t1)?;
    if plan.is_identity() {
        return Ok(DisplacementField::zeros(domain.clone()));
    }

    let data: Vec<_> = (0..domain.num_voxels())
        .into_par_iter()
        .map(|idx| {
            let x = domain.voxel_to_world(idx);
            integrator.step(&x, t0, plan.step) - x
        })
        .collect();
    check_finite(&data, 0)?;

    let mut current = DisplacementField::new(domain.clone(), data)?;
    for squaring in 1..=plan.squarings {
        let previous = &current;
        let next: Vec<_> = (0..domain.num_voxels())
            .into_par_iter()
            .map(|idx| {
                let d = previous.data()[idx];
                let moved = domain.voxel_to_world(idx) + d;
                d + previous.sample_linear(&domain.world_to_index(&moved))
            })
            .collect();
        check_finite(&next, squaring as usize)?;
        current = DisplacementField::new(domain.clone(), next)?;
    }
    debug!(squarings = plan.squarings, voxels = domain.num_voxels(), "dense exponentiation");
    Ok(current)
}

fn check_finite(data: &[Vector3], step: usize) -> Result<()> {
    match data.iter().position(|d| !is_finite_vector(d)) {
        Some(idx) => Err(TransformError::divergence(step, &Point3::from(data[idx]))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::{CubicBSpline, VelocityEvaluator};
    use crate::lattice::ControlLattice;

    #[test]
    fn test_dense_uniform_field_is_exact() {
        let domain = ImageDomain::axis_aligned([6, 6, 6], Point3::new(6.0, 6.0, 6.0), Vector3::repeat(1.0)).unwrap();
        let geometry = ImageDomain::axis_aligned([12, 12, 12], Point3::origin(), Vector3::repeat(2.0)).unwrap();
        let mut lattice = ControlLattice::new(geometry);
        let v = Vector3::new(0.4, -0.2, 0.1);
        for node in 0..lattice.num_nodes() {
            lattice.set_node_value(node, &v).unwrap();
        }
        let field = VelocityEvaluator::<CubicBSpline>::new(&lattice);
        let config = IntegrationConfig::default();
        let d = exponentiate_dense(&field, &config, &domain, 0.0, 1.5).unwrap();
        for value in d.data() {
            assert!((value - v * 1.5).norm() < 1e-12);
        }
    }

    #[test]
    fn test_zero_field_is_identity() {
        let domain = ImageDomain::axis_aligned([3, 3, 3], Point3::origin(), Vector3::repeat(1.0)).unwrap();
        let lattice = ControlLattice::new(domain.clone());
        let field = VelocityEvaluator::<CubicBSpline>::new(&lattice);
        let d = exponentiate_dense(&field, &IntegrationConfig::default(), &domain, 0.0, 1.0).unwrap();
        assert_eq!(d.max_norm(), 0.0);
    }
}
