//! Capabilities shared by every transformation variant.

use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Result;
use crate::image::{DisplacementField, ImageDomain};
use crate::integration::{Inversion, Trajectory};
use crate::lattice::DofStatus;
use crate::spatial::{Point3, Vector3};

/// Spatial mapping parameterized by a flat vector of DOFs.
///
/// `t0` and `t1` are the source and target times; time-independent variants
/// ignore them.
pub trait SpatialTransform: Send + Sync {
    fn num_dofs(&self) -> usize;

    fn get(&self, dof: usize) -> Result<f64>;

    /// Write one DOF. Invalidates every cache derived from the DOFs.
    fn put(&mut self, dof: usize, value: f64) -> Result<()>;

    fn status(&self, dof: usize) -> Result<DofStatus>;

    fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()>;

    /// Counter that moves whenever the mapping changes.
    fn version(&self) -> u64;

    /// Image of `p` under the mapping from `t0` to `t1`.
    fn transform(&self, p: &Point3, t0: f64, t1: f64) -> Result<Point3>;

    /// Preimage of `p`.
    fn inverse(&self, p: &Point3, t0: f64, t1: f64) -> Result<Inversion>;

    /// Displacement at every voxel of `domain`.
    fn displacement(&self, domain: &ImageDomain, t0: f64, t1: f64) -> Result<Arc<DisplacementField>> {
        let data = (0..domain.num_voxels())
            .into_par_iter()
            .map(|idx| {
                let x = domain.voxel_to_world(idx);
                self.transform(&x, t0, t1).map(|y| y - x)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(DisplacementField::new(domain.clone(), data)?))
    }

    /// Gradient evaluator for points mapped from `t0` to `t1`.
    ///
    /// With a `domain`, the evaluator differentiates exactly the map used by
    /// [`SpatialTransform::displacement`] on that domain.
    fn point_gradient(
        &self,
        domain: Option<&ImageDomain>,
        t0: f64,
        t1: f64,
    ) -> Result<Box<dyn PointGradient + '_>>;

    /// Whether the parametric gradient reaches `dof`. Unreachable DOFs are
    /// left out of every gradient, passive ones included.
    fn is_differentiable(&self, _dof: usize) -> bool {
        true
    }

    /// Fails when an active DOF cannot be differentiated.
    fn check_gradient_support(&self) -> Result<()> {
        Ok(())
    }
}

/// Chain rule through the mapping of single points.
pub trait PointGradient: Sync {
    /// Add `(∂φ(p)/∂θ)ᵀ · g` to `grad`, which spans every DOF of the
    /// transformation. `scratch` is per-worker storage for the trajectory.
    fn accumulate(&self, p: &Point3, g: &Vector3, grad: &mut [f64], scratch: &mut Trajectory) -> Result<()>;
}
