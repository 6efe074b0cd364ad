//! Scaling-and-squaring exponentiation of velocity fields at single points.
//!
//! The time interval is split into `2^N` substeps, with `N` chosen so that no
//! substep moves a point by more than `max_substep` cells. Composing the
//! small-step map with itself `2^N` times yields the exponential map; for a
//! single point the composition is unrolled, which makes the result exact
//! self-composition of the one-step map and lets the adjoint retrace it.

use rayon::prelude::*;
use tracing::debug;

use super::config::IntegrationConfig;
use super::field::VelocityField;
use super::trajectory::{StageRecord, Trajectory};
use crate::error::{Result, TransformError};
use crate::image::{DisplacementField, ImageDomain};
use crate::spatial::{is_finite_vector, Aabb, Matrix3, Point3, Vector3};

/// Cell size assumed when a field carries no lattice of its own.
const DEFAULT_CELL_SIZE: f64 = 1.0;

/// Step schedule of one exponentiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPlan {
    /// Number of squarings `N`; zero for the identity plan.
    pub squarings: u32,
    /// Number of substeps, `2^N`, or zero for the identity plan.
    pub substeps: usize,
    /// Signed substep length `(t1 - t0) / 2^N`.
    pub step: f64,
    pub t0: f64,
    pub t1: f64,
}

impl IntegrationPlan {
    /// Plan that leaves every point where it is.
    pub fn identity(t0: f64, t1: f64) -> Self {
        Self {
            squarings: 0,
            substeps: 0,
            step: 0.0,
            t0,
            t1,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.substeps == 0
    }

    /// Same schedule run from `t1` back to `t0`.
    pub fn reversed(&self) -> Self {
        Self {
            squarings: self.squarings,
            substeps: self.substeps,
            step: -self.step,
            t0: self.t1,
            t1: self.t0,
        }
    }

    /// Start time of substep `k`.
    pub fn time(&self, k: usize) -> f64 {
        self.t0 + k as f64 * self.step
    }

    /// Choose the number of squarings for a speed bound and cell size.
    ///
    /// `N` is the smallest count, at least `min_squarings`, for which
    /// `bound * |T| / 2^N < max_substep * cell` holds strictly.
    pub fn compute(config: &IntegrationConfig, bound: f64, cell: f64, t0: f64, t1: f64) -> Result<Self> {
        config.validate()?;
        let span = t1 - t0;
        if !bound.is_finite() || !span.is_finite() {
            return Err(TransformError::configuration(format!(
                "cannot plan integration with speed bound {bound} over [{t0}, {t1}]"
            )));
        }
        if !(cell > 0.0) {
            return Err(TransformError::configuration(format!("cell size must be positive, got {cell}")));
        }
        if bound == 0.0 || span == 0.0 {
            return Ok(Self::identity(t0, t1));
        }

        let ratio = bound * span.abs() / (config.max_substep * cell);
        let needed = if ratio < 1.0 { 0 } else { ratio.log2().floor() as u32 + 1 };
        let squarings = needed.max(config.min_squarings);
        if squarings > config.max_squarings {
            return Err(TransformError::configuration(format!(
                "integration needs {squarings} squarings (speed bound {bound:.4}, |T| = {:.4}, cell {cell:.4}) \
                 but max_squarings is {}",
                span.abs(),
                config.max_squarings
            )));
        }
        let substeps = 1usize << squarings;
        Ok(Self {
            squarings,
            substeps,
            step: span / substeps as f64,
            t0,
            t1,
        })
    }
}

/// Exponentiates a velocity field along single-point trajectories.
pub struct Integrator<'a, F: VelocityField + ?Sized> {
    field: &'a F,
    config: &'a IntegrationConfig,
}

impl<'a, F: VelocityField + ?Sized> Integrator<'a, F> {
    pub fn new(field: &'a F, config: &'a IntegrationConfig) -> Self {
        Self { field, config }
    }

    pub fn field(&self) -> &'a F {
        self.field
    }

    pub fn config(&self) -> &'a IntegrationConfig {
        self.config
    }

    /// Plan for all points of `region`, measuring substeps in units of `cell`.
    pub fn plan(&self, region: &Aabb, cell: f64, t0: f64, t1: f64) -> Result<IntegrationPlan> {
        let bound = self.field.speed_bound(region);
        let plan = IntegrationPlan::compute(self.config, bound, cell, t0, t1)?;
        debug!(
            squarings = plan.squarings,
            substeps = plan.substeps,
            speed_bound = bound,
            cell,
            "integration plan"
        );
        Ok(plan)
    }

    /// Cell size every plan is measured in.
    pub fn plan_cell(&self) -> f64 {
        self.field.cell_size().unwrap_or(DEFAULT_CELL_SIZE)
    }

    /// Plan for one point.
    ///
    /// Points and domains share one rule: the cell is the field's own, never
    /// the sampling grid, so a voxel maps the same way on its own as inside
    /// a domain whenever the field's speed bound does not vary between the
    /// two regions.
    pub fn plan_for_point(&self, p: &Point3, t0: f64, t1: f64) -> Result<IntegrationPlan> {
        let bound = self.field.speed_bound(&Aabb::from_point(p));
        IntegrationPlan::compute(self.config, bound, self.plan_cell(), t0, t1)
    }

    /// Plan for every voxel of `domain`.
    pub fn plan_for_domain(&self, domain: &ImageDomain, t0: f64, t1: f64) -> Result<IntegrationPlan> {
        self.plan(&domain.bounding_box(), self.plan_cell(), t0, t1)
    }

    /// Map `p` through the plan.
    pub fn integrate(&self, p: &Point3, plan: &IntegrationPlan) -> Result<Point3> {
        let mut x = *p;
        for k in 0..plan.substeps {
            x = self.step(&x, plan.time(k), plan.step);
            if !is_finite_vector(&x.coords) {
                return Err(TransformError::divergence(k, &x));
            }
        }
        Ok(x)
    }

    /// Displacement `φ(x) - x` at every voxel of `domain`, one exact
    /// pointwise exponentiation per voxel.
    pub fn displacement(&self, domain: &ImageDomain, plan: &IntegrationPlan) -> Result<DisplacementField> {
        if plan.is_identity() {
            return Ok(DisplacementField::zeros(domain.clone()));
        }
        let data = (0..domain.num_voxels())
            .into_par_iter()
            .map(|idx| {
                let x = domain.voxel_to_world(idx);
                self.integrate(&x, plan).map(|y| y - x)
            })
            .collect::<Result<Vec<_>>>()?;
        DisplacementField::new(domain.clone(), data)
    }

    /// Map `p` and return the spatial Jacobian `∂φ/∂x` of the discrete map.
    pub fn integrate_with_jacobian(&self, p: &Point3, plan: &IntegrationPlan) -> Result<(Point3, Matrix3)> {
        let mut x = *p;
        let mut total = Matrix3::identity();
        for k in 0..plan.substeps {
            let (next, step_jacobian) = self.step_with_jacobian(&x, plan.time(k), plan.step);
            if !is_finite_vector(&next.coords) || !step_jacobian.iter().all(|v| v.is_finite()) {
                return Err(TransformError::divergence(k, &next));
            }
            x = next;
            total = step_jacobian * total;
        }
        Ok((x, total))
    }

    /// Map `p`, recording every stage for a later adjoint pass.
    pub fn integrate_recording(
        &self,
        p: &Point3,
        plan: &IntegrationPlan,
        trajectory: &mut Trajectory,
    ) -> Result<Point3> {
        trajectory.reset(self.config.scheme, plan.step, *p);
        let (a, c, b) = self.config.scheme.tableau();
        let h = plan.step;
        let mut x = *p;
        for k in 0..plan.substeps {
            let t = plan.time(k);
            let mut prev = Vector3::zeros();
            let mut incr = Vector3::zeros();
            for i in 0..a.len() {
                let point = x + prev * (h * a[i]);
                let time = t + c[i] * h;
                let (v, jacobian) = self.field.velocity_and_jacobian(&point, time);
                trajectory.push(StageRecord { point, time, jacobian });
                incr += v * b[i];
                prev = v;
            }
            x += incr * h;
            if !is_finite_vector(&x.coords) {
                return Err(TransformError::divergence(k, &x));
            }
        }
        trajectory.finish(x);
        Ok(x)
    }

    /// One explicit substep from `(x, t)` with signed length `h`.
    pub(crate) fn step(&self, x: &Point3, t: f64, h: f64) -> Point3 {
        let (a, c, b) = self.config.scheme.tableau();
        let mut prev = Vector3::zeros();
        let mut incr = Vector3::zeros();
        for i in 0..a.len() {
            let v = self.field.velocity(&(x + prev * (h * a[i])), t + c[i] * h);
            incr += v * b[i];
            prev = v;
        }
        x + incr * h
    }

    fn step_with_jacobian(&self, x: &Point3, t: f64, h: f64) -> (Point3, Matrix3) {
        let (a, c, b) = self.config.scheme.tableau();
        let mut prev = Vector3::zeros();
        let mut prev_d = Matrix3::zeros();
        let mut incr = Vector3::zeros();
        let mut incr_d = Matrix3::zeros();
        for i in 0..a.len() {
            let (v, jacobian) = self.field.velocity_and_jacobian(&(x + prev * (h * a[i])), t + c[i] * h);
            let dk = jacobian * (Matrix3::identity() + prev_d * (h * a[i]));
            incr += v * b[i];
            incr_d += dk * b[i];
            prev = v;
            prev_d = dk;
        }
        (x + incr * h, Matrix3::identity() + incr_d * h)
    }
}
