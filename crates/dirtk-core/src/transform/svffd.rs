//! Stationary velocity free-form deformation.
//!
//! A time-invariant velocity field on a cubic B-spline lattice, exponentiated
//! by scaling and squaring: `T(x) = exp((t1 - t0) v)(x)`. Invertible by
//! construction as long as the substep bound holds.

use std::sync::Arc;

use super::flow::{flow_displacement, flow_inverse, flow_transform, FlowGradient};
use super::trait_::{PointGradient, SpatialTransform};
use crate::cache::DisplacementCache;
use crate::error::{Result, TransformError};
use crate::image::{DisplacementField, ImageDomain};
use crate::integration::{exponentiate_dense, IntegrationConfig, Inversion};
use crate::interpolation::{CubicBSpline, VelocityEvaluator};
use crate::lattice::{ControlLattice, DofStatus};
use crate::spatial::{Point3, Vector3};

/// Stationary velocity FFD.
#[derive(Debug, Clone)]
pub struct Svffd {
    lattice: ControlLattice,
    config: IntegrationConfig,
    cache: DisplacementCache,
}

impl Svffd {
    pub fn new(lattice: ControlLattice) -> Result<Self> {
        Self::with_config(lattice, IntegrationConfig::default())
    }

    pub fn with_config(lattice: ControlLattice, config: IntegrationConfig) -> Result<Self> {
        if lattice.is_temporal() {
            return Err(TransformError::configuration(
                "stationary velocity FFD needs a lattice without temporal nodes",
            ));
        }
        config.validate()?;
        Ok(Self {
            lattice,
            config,
            cache: DisplacementCache::new(),
        })
    }

    /// Zero velocity on a lattice covering `domain`.
    pub fn covering(domain: &ImageDomain, control_spacing: f64) -> Result<Self> {
        Self::new(ControlLattice::covering(domain, control_spacing)?)
    }

    pub fn lattice(&self) -> &ControlLattice {
        &self.lattice
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Change the integration settings. Cached displacements are dropped.
    pub fn set_config(&mut self, config: IntegrationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.cache.clear();
        Ok(())
    }

    /// Take over an already validated configuration.
    pub(crate) fn adopt_config(&mut self, config: &IntegrationConfig) {
        if &self.config != config {
            self.config = config.clone();
            self.cache.clear();
        }
    }

    pub fn evaluator(&self) -> VelocityEvaluator<'_, CubicBSpline> {
        VelocityEvaluator::new(&self.lattice)
    }

    /// Stationary velocity at `p`.
    pub fn velocity(&self, p: &Point3) -> Vector3 {
        self.evaluator().evaluate(p, 0.0)
    }

    pub fn put_all(&mut self, values: &[f64]) -> Result<()> {
        self.lattice.put_all(values)?;
        self.cache.clear();
        Ok(())
    }

    pub fn add(&mut self, dof: usize, delta: f64) -> Result<()> {
        self.lattice.add(dof, delta)?;
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

    /// Approximate displacement by dense squaring of a grid field, whatever
    /// the configured [`DisplacementMethod`](crate::integration::DisplacementMethod). Not cached.
    pub fn displacement_by_squaring(&self, domain: &ImageDomain, t0: f64, t1: f64) -> Result<DisplacementField> {
        exponentiate_dense(&self.evaluator(), &self.config, domain, t0, t1)
    }

    /// Mutable lattice; drops cached displacements.
    pub(crate) fn lattice_mut(&mut self) -> &mut ControlLattice {
        self.cache.clear();
        &mut self.lattice
    }
}

impl SpatialTransform for Svffd {
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
