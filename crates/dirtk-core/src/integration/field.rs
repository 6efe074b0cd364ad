//! Velocity field contract consumed by the integrator.

use crate::spatial::{Aabb, Matrix3, Point3, Vector3};

/// A (possibly time-varying) velocity field parameterized by DOFs.
///
/// Implementations must be safe to share read-only between worker threads.
pub trait VelocityField: Sync {
    /// Velocity at world point `p` and time `t`.
    fn velocity(&self, p: &Point3, t: f64) -> Vector3;

    /// Spatial Jacobian `∂v/∂x` in world units.
    fn velocity_jacobian(&self, p: &Point3, t: f64) -> Matrix3;

    fn velocity_and_jacobian(&self, p: &Point3, t: f64) -> (Vector3, Matrix3) {
        (self.velocity(p, t), self.velocity_jacobian(p, t))
    }

    /// Upper bound on `‖v‖` for points in `region`.
    fn speed_bound(&self, region: &Aabb) -> f64;

    /// Characteristic cell size of the parameterization, if it has one.
    fn cell_size(&self) -> Option<f64>;

    /// Whether the field is independent of time.
    fn is_stationary(&self) -> bool {
        true
    }

    /// Length of the DOF gradient buffers passed to
    /// [`VelocityField::accumulate_dof_gradient`].
    fn num_dofs(&self) -> usize;

    /// Add `(∂v(p, t)/∂θ)ᵀ · adjoint` to `grad`.
    fn accumulate_dof_gradient(&self, p: &Point3, t: f64, adjoint: &Vector3, grad: &mut [f64]);
}
