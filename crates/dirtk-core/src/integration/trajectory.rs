//! Per-point record of an integration pass, replayed by the adjoint.

use super::config::IntegrationScheme;
use super::field::VelocityField;
use crate::spatial::{Matrix3, Point3, Vector3};

/// One stage evaluation: where and when the velocity was sampled, and its
/// spatial Jacobian there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageRecord {
    pub point: Point3,
    pub time: f64,
    pub jacobian: Matrix3,
}

/// Stage samples of every substep of one point's integration.
///
/// Buffers are reused between points: [`Trajectory::reset`] keeps the
/// allocation, so a worker can hold one trajectory for a whole sweep.
#[derive(Debug, Clone)]
pub struct Trajectory {
    scheme: IntegrationScheme,
    step: f64,
    stages: Vec<StageRecord>,
    start: Point3,
    end: Point3,
}

impl Default for Trajectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Trajectory {
    pub fn new() -> Self {
        Self {
            scheme: IntegrationScheme::Euler,
            step: 0.0,
            stages: Vec::new(),
            start: Point3::origin(),
            end: Point3::origin(),
        }
    }

    /// Start a new record, keeping the allocated capacity.
    pub(crate) fn reset(&mut self, scheme: IntegrationScheme, step: f64, start: Point3) {
        self.scheme = scheme;
        self.step = step;
        self.stages.clear();
        self.start = start;
        self.end = start;
    }

    pub(crate) fn push(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    pub(crate) fn finish(&mut self, end: Point3) {
        self.end = end;
    }

    pub fn scheme(&self) -> IntegrationScheme {
        self.scheme
    }

    /// Signed substep length.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn num_steps(&self) -> usize {
        self.stages.len() / self.scheme.num_stages()
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn start_point(&self) -> &Point3 {
        &self.start
    }

    pub fn end_point(&self) -> &Point3 {
        &self.end
    }

    /// Displacement of the recorded point.
    pub fn displacement(&self) -> Vector3 {
        self.end - self.start
    }

    /// Reverse pass through the recorded substeps.
    ///
    /// Given `end_adjoint = ∂E/∂φ(x)`, adds `(∂φ(x)/∂θ)ᵀ · end_adjoint` to
    /// `grad` and returns `∂E/∂x`. The stages are visited exactly in reverse,
    /// so the result is the derivative of the discrete forward map.
    pub fn adjoint<F>(&self, field: &F, end_adjoint: &Vector3, grad: &mut [f64]) -> Vector3
    where
        F: VelocityField + ?Sized,
    {
        let (a, _, b) = self.scheme.tableau();
        let stages = self.scheme.num_stages();
        let h = self.step;
        let mut lambda = *end_adjoint;
        let mut stage_adjoint = [Vector3::zeros(); 4];

        for step in self.stages.chunks_exact(stages).rev() {
            for (i, adj) in stage_adjoint.iter_mut().take(stages).enumerate() {
                *adj = lambda * (h * b[i]);
            }
            let mut acc = Vector3::zeros();
            for i in (0..stages).rev() {
                let record = &step[i];
                let adj = stage_adjoint[i];
                field.accumulate_dof_gradient(&record.point, record.time, &adj, grad);
                let mu = record.jacobian.transpose() * adj;
                acc += mu;
                if i > 0 {
                    stage_adjoint[i - 1] += mu * (h * a[i]);
                }
            }
            lambda += acc;
        }
        lambda
    }
}
