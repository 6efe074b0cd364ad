//! Temporal diffeomorphic free-form deformation.
//!
//! A time-varying velocity field on a 4-D cubic B-spline lattice. Points are
//! carried from `t0` to `t1` along the flow, so `T(t0 -> t1)` composes with
//! `T(t1 -> t2)` to give `T(t0 -> t2)` up to integration error.

use std::sync::Arc;

use super::flow::{flow_displacement, flow_inverse, flow_transform, FlowGradient};
use super::trait_::{PointGradient, SpatialTransform};
use crate::cache::DisplacementCache;
use crate::error::Result;
use crate::image::{DisplacementField, ImageDomain};
use crate::integration::{IntegrationConfig, Inversion};
use crate::interpolation::{CubicBSpline, VelocityEvaluator};
use crate::lattice::{ControlLattice, DofStatus};
use crate::spatial::{Point3, Vector3};

#[derive(Debug, Clone)]
pub struct TemporalDiffeomorphicFfd {
    lattice: ControlLattice,
    config: IntegrationConfig,
    cache: DisplacementCache,
}

impl TemporalDiffeomorphicFfd {
    pub fn new(lattice: ControlLattice) -> Result<Self> {
        Self::with_config(lattice, IntegrationConfig::default())
    }

    pub fn with_config(lattice: ControlLattice, config: IntegrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lattice,
            config,
            cache: DisplacementCache::new(),
        })
    }

    /// Zero velocity on `nt` temporal nodes over a lattice covering `domain`.
    pub fn covering(domain: &ImageDomain, control_spacing: f64, nt: usize, t_origin: f64, t_spacing: f64) -> Result<Self> {
        let spatial = ControlLattice::covering(domain, control_spacing)?;
        Self::new(ControlLattice::temporal(spatial.geometry().clone(), nt, t_origin, t_spacing)?)
    }

    pub fn lattice(&self) -> &ControlLattice {
        &self.lattice
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn evaluator(&self) -> VelocityEvaluator<'_, CubicBSpline> {
        VelocityEvaluator::new(&self.lattice)
    }

    /// Velocity at `p` and time `t`.
    pub fn velocity(&self, p: &Point3, t: f64) -> Vector3 {
        self.evaluator().evaluate(p, t)
    }

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
}

impl SpatialTransform for TemporalDiffeomorphicFfd {
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

    fn transform(&self, p: &Point3, t0: f64, t1: f64) -> Result<Point3> {
        flow_transform(&self.evaluator(), &self.config, p, t0, t1)
    }

    fn inverse(&self, p: &Point3, t0: f64, t1: f64) -> Result<Inversion> {
        flow_inverse(&self.evaluator(), &self.config, p, t0, t1)
    }

    fn displacement(&self, domain: &ImageDomain, t0: f64, t1: f64) -> Result<Arc<DisplacementField>> {
        self.cache.get_or_try_insert_with(domain, t0, t1, self.lattice.version(), || {
            flow_displacement(&self.evaluator(), &self.config, domain, t0, t1)
        })
    }

    fn point_gradient(&self, domain: Option<&ImageDomain>, t0: f64, t1: f64) -> Result<Box<dyn PointGradient + '_>> {
        Ok(Box::new(FlowGradient::new(self.evaluator(), &self.config, domain, t0, t1)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::IntegrationScheme;

    fn td() -> TemporalDiffeomorphicFfd {
        let geometry = ImageDomain::axis_aligned([6, 6, 6], Point3::origin(), Vector3::repeat(1.0)).unwrap();
        let lattice = ControlLattice::temporal(geometry, 4, 0.0, 1.0 / 3.0).unwrap();
        let config = IntegrationConfig::new(IntegrationScheme::RungeKutta4);
        let mut td = TemporalDiffeomorphicFfd::with_config(lattice, config).unwrap();
        for l in 0..4 {
            let node = td.lattice().node_index(2, 3, 2, l);
            td.set_node_value(node, &Vector3::new(0.5 * l as f64, 0.2, -0.1)).unwrap();
        }
        td
    }

    #[test]
    fn test_velocity_varies_in_time() {
        let td = td();
        let p = Point3::new(2.0, 3.0, 2.0);
        assert!((td.velocity(&p, 0.0) - td.velocity(&p, 1.0)).norm() > 0.05);
    }

    #[test]
    fn test_flow_composes_over_intervals() {
        let td = td();
        let p = Point3::new(2.2, 2.9, 2.1);
        let direct = td.transform(&p, 0.0, 1.0).unwrap();
        let mid = td.transform(&p, 0.0, 0.5).unwrap();
        let chained = td.transform(&mid, 0.5, 1.0).unwrap();
        assert!((direct - chained).norm() < 1e-6);
    }

    #[test]
    fn test_backward_interval_inverts_forward() {
        let td = td();
        let p = Point3::new(1.8, 3.1, 2.5);
        let q = td.transform(&p, 0.2, 0.9).unwrap();
        let inv = td.inverse(&q, 0.2, 0.9).unwrap();
        assert!(inv.converged);
        assert!((inv.point - p).norm() < 1e-6);
        let back = td.transform(&q, 0.9, 0.2).unwrap();
        assert!((back - p).norm() < 1e-6);
    }
}
