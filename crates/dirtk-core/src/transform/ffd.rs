//! Free-form deformations: displacement interpolated directly from a
//! control lattice, `T(x) = x + d(x)`.

use std::marker::PhantomData;
use std::sync::Arc;

use super::trait_::{PointGradient, SpatialTransform};
use crate::cache::DisplacementCache;
use crate::error::{Result, TransformError};
use crate::image::{DisplacementField, ImageDomain};
use crate::integration::{newton_inverse, IntegrationConfig, Inversion, Trajectory, VelocityField};
use crate::interpolation::{CubicBSpline, LinearKernel, SeparableKernel, VelocityEvaluator};
use crate::lattice::{ControlLattice, DofStatus};
use crate::spatial::{Matrix3, Point3, Vector3};

/// Free-form deformation with interpolation kernel `K`.
#[derive(Debug, Clone)]
pub struct FreeFormTransform<K: SeparableKernel> {
    lattice: ControlLattice,
    config: IntegrationConfig,
    cache: DisplacementCache,
    kernel: PhantomData<K>,
}

/// FFD with trilinear interpolation of the control displacements.
pub type LinearFfd = FreeFormTransform<LinearKernel>;

/// FFD with cubic B-spline interpolation of the control displacements.
pub type BSplineFfd = FreeFormTransform<CubicBSpline>;

impl<K: SeparableKernel> FreeFormTransform<K> {
    pub fn new(lattice: ControlLattice) -> Result<Self> {
        if lattice.is_temporal() {
            return Err(TransformError::configuration(format!(
                "{} free-form deformation needs a spatial lattice",
                K::NAME
            )));
        }
        Ok(Self {
            lattice,
            config: IntegrationConfig::default(),
            cache: DisplacementCache::new(),
            kernel: PhantomData,
        })
    }

    /// Zero deformation on a lattice covering `domain`.
    pub fn covering(domain: &ImageDomain, control_spacing: f64) -> Result<Self> {
        Self::new(ControlLattice::covering(domain, control_spacing)?)
    }

    /// Use `config` for the inverse search settings.
    pub fn with_config(mut self, config: IntegrationConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn lattice(&self) -> &ControlLattice {
        &self.lattice
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn evaluator(&self) -> VelocityEvaluator<'_, K> {
        VelocityEvaluator::new(&self.lattice)
    }

    /// Replace all DOF values.
    pub fn put_all(&mut self, values: &[f64]) -> Result<()> {
        self.lattice.put_all(values)?;
        self.cache.clear();
        Ok(())
    }

    pub fn set_node_value(&mut self, node: usize, value: &Vector3) -> Result<()> {
        self.lattice.set_node_value(node, value)?;
        self.cache.clear();
        Ok(())
    }

    pub fn set_all_status(&mut self, status: DofStatus) {
        self.lattice.set_all_status(status);
    }

    fn map_with_jacobian(&self, x: &Point3) -> (Point3, Matrix3) {
        let (d, jacobian) = self.evaluator().evaluate_with_jacobian(x, 0.0);
        (x + d, Matrix3::identity() + jacobian)
    }
}

impl<K: SeparableKernel> SpatialTransform for FreeFormTransform<K> {
    fn num_dofs(&self) -> usize {
        self.lattice.num_dofs()
    }

    fn get(&self, dof: usize) -> Result<f64> {
        self.lattice.get(dof)
    }

    fn put(&mut self, dof: usize, value: f64) -> Result<()> {
        self.lattice.put(dof, value)?;
        self.cache.clear();
        Ok(())
    }

    fn status(&self, dof: usize) -> Result<DofStatus> {
        self.lattice.status(dof)
    }

    fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()> {
        self.lattice.set_status(dof, status)
    }

    fn version(&self) -> u64 {
        self.lattice.version()
    }

    fn transform(&self, p: &Point3, _t0: f64, _t1: f64) -> Result<Point3> {
        Ok(p + self.evaluator().evaluate(p, 0.0))
    }

    fn inverse(&self, p: &Point3, _t0: f64, _t1: f64) -> Result<Inversion> {
        let guess = p - self.evaluator().evaluate(p, 0.0);
        newton_inverse(
            p,
            guess,
            self.config.inverse_tolerance,
            self.config.inverse_max_iterations,
            |x| Ok(self.map_with_jacobian(x)),
        )
    }

    fn displacement(&self, domain: &ImageDomain, _t0: f64, _t1: f64) -> Result<Arc<DisplacementField>> {
        // Time independent: every interval shares one cache entry.
        self.cache
            .get_or_try_insert_with(domain, 0.0, 0.0, self.lattice.version(), || {
                let evaluator = self.evaluator();
                let field = DisplacementField::from_world_fn(domain.clone(), |x| evaluator.evaluate(x, 0.0));
                match field.first_non_finite() {
                    Some(idx) => Err(TransformError::divergence(0, &domain.voxel_to_world(idx))),
                    None => Ok(field),
                }
            })
    }

    fn point_gradient(&self, _domain: Option<&ImageDomain>, _t0: f64, _t1: f64) -> Result<Box<dyn PointGradient + '_>> {
        Ok(Box::new(LatticeGradient {
            evaluator: self.evaluator(),
        }))
    }
}

/// `∂T(p)/∂θ` is the interpolation weight of each control node.
struct LatticeGradient<'a, K: SeparableKernel> {
    evaluator: VelocityEvaluator<'a, K>,
}

impl<K: SeparableKernel> PointGradient for LatticeGradient<'_, K> {
    fn accumulate(&self, p: &Point3, g: &Vector3, grad: &mut [f64], _scratch: &mut Trajectory) -> Result<()> {
        self.evaluator.accumulate_dof_gradient(p, 0.0, g, grad);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffd() -> BSplineFfd {
        let geometry = ImageDomain::axis_aligned([6, 6, 6], Point3::origin(), Vector3::repeat(2.0)).unwrap();
        let mut ffd = BSplineFfd::new(ControlLattice::new(geometry)).unwrap();
        let node = ffd.lattice().node_index(2, 3, 2, 0);
        ffd.set_node_value(node, &Vector3::new(0.6, -0.3, 0.2)).unwrap();
        ffd
    }

    #[test]
    fn test_ffd_inverse_round_trip() {
        let ffd = ffd();
        let p = Point3::new(4.3, 5.5, 3.9);
        let q = ffd.transform(&p, 0.0, 1.0).unwrap();
        assert!((q - p).norm() > 1e-3);
        let inv = ffd.inverse(&q, 0.0, 1.0).unwrap();
        assert!(inv.converged);
        assert!((inv.point - p).norm() < 1e-8);
    }

    #[test]
    fn test_ffd_displacement_is_cached_until_put() {
        let mut ffd = ffd();
        let domain = ImageDomain::axis_aligned([4, 4, 4], Point3::new(2.0, 2.0, 2.0), Vector3::repeat(1.5)).unwrap();
        let a = ffd.displacement(&domain, 0.0, 1.0).unwrap();
        let b = ffd.displacement(&domain, 0.0, 1.0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        ffd.put(0, 0.1).unwrap();
        let c = ffd.displacement(&domain, 0.0, 1.0).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_linear_ffd_interpolates_nodes() {
        let geometry = ImageDomain::axis_aligned([3, 3, 3], Point3::origin(), Vector3::repeat(1.0)).unwrap();
        let mut ffd = LinearFfd::new(ControlLattice::new(geometry)).unwrap();
        let node = ffd.lattice().node_index(1, 1, 1, 0);
        ffd.set_node_value(node, &Vector3::new(0.25, 0.0, 0.0)).unwrap();
        let q = ffd.transform(&Point3::new(1.0, 1.0, 1.0), 0.0, 1.0).unwrap();
        assert!((q - Point3::new(1.25, 1.0, 1.0)).norm() < 1e-14);
    }

    #[test]
    fn test_temporal_lattice_rejected() {
        let geometry = ImageDomain::axis_aligned([3, 3, 3], Point3::origin(), Vector3::repeat(1.0)).unwrap();
        let lattice = ControlLattice::temporal(geometry, 2, 0.0, 1.0).unwrap();
        assert!(BSplineFfd::new(lattice).is_err());
    }
}
