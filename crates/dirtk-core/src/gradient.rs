//! Parametric gradients by adjoint propagation.
//!
//! An energy term supplies `∂E/∂d` at every voxel of its target domain. The
//! engine pulls it back to the DOFs through the same discrete map that
//! produced the displacements: each voxel replays its trajectory in reverse,
//! accumulating Jacobian-vector products into a per-worker buffer, and the
//! buffers are summed at the end. Summation order across voxels is
//! unspecified, so results agree only up to rounding between runs.

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TransformError};
use crate::image::GradientImage;
use crate::integration::Trajectory;
use crate::spatial::{Point3, Vector3};
use crate::transform::SpatialTransform;

/// Options for parametric gradient evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientOptions {
    /// Also accumulate into passive DOFs.
    pub include_passive: bool,
}

impl GradientOptions {
    pub fn with_passive(mut self, include_passive: bool) -> Self {
        self.include_passive = include_passive;
        self
    }
}

/// Chain rule from displacement gradients to DOF gradients.
pub struct AdjointGradientEngine<'a, T: SpatialTransform + ?Sized> {
    transform: &'a T,
    options: GradientOptions,
}

impl<'a, T: SpatialTransform + ?Sized> AdjointGradientEngine<'a, T> {
    pub fn new(transform: &'a T) -> Self {
        Self {
            transform,
            options: GradientOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GradientOptions) -> Self {
        self.options = options;
        self
    }

    /// DOFs that receive gradient contributions: active ones, or all with
    /// `include_passive`, restricted to those the transformation can
    /// differentiate.
    pub fn dof_mask(&self) -> Result<Vec<bool>> {
        (0..self.transform.num_dofs())
            .map(|dof| {
                self.transform.status(dof).map(|s| {
                    self.transform.is_differentiable(dof) && (self.options.include_passive || s.is_active())
                })
            })
            .collect()
    }

    /// Add `weight · Σ_voxels (∂d/∂θ)ᵀ · gradient[voxel]` to `out`.
    ///
    /// The gradient image defines the domain; the displacement being
    /// differentiated is the one [`SpatialTransform::displacement`] returns
    /// for that domain and interval. Excluded DOFs are left untouched.
    pub fn parametric_gradient(
        &self,
        gradient: &GradientImage,
        out: &mut [f64],
        weight: f64,
        t0: f64,
        t1: f64,
    ) -> Result<()> {
        let n = self.transform.num_dofs();
        if out.len() != n {
            return Err(TransformError::ShapeMismatch {
                expected: vec![n],
                actual: vec![out.len()],
            });
        }
        self.transform.check_gradient_support()?;
        if let Some(voxel) = gradient.first_non_finite() {
            return Err(TransformError::configuration(format!(
                "non-finite displacement gradient at voxel {voxel}"
            )));
        }
        if weight == 0.0 {
            return Ok(());
        }

        let domain = gradient.domain();
        let point_gradient = self.transform.point_gradient(Some(domain), t0, t1)?;
        let total = (0..domain.num_voxels())
            .into_par_iter()
            .try_fold(
                || (vec![0.0; n], Trajectory::new()),
                |(mut acc, mut scratch), idx| {
                    let g = gradient.data()[idx];
                    if g != Vector3::zeros() {
                        point_gradient.accumulate(&domain.voxel_to_world(idx), &g, &mut acc, &mut scratch)?;
                    }
                    Ok::<_, TransformError>((acc, scratch))
                },
            )
            .map(|partial| partial.map(|(acc, _)| acc))
            .try_reduce(
                || vec![0.0; n],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(&b) {
                        *x += y;
                    }
                    Ok(a)
                },
            )?;

        let mask = self.dof_mask()?;
        let mut touched = 0usize;
        for ((o, g), include) in out.iter_mut().zip(&total).zip(&mask) {
            if *include {
                *o += weight * g;
                touched += usize::from(*g != 0.0);
            }
        }
        debug!(voxels = domain.num_voxels(), dofs = n, touched, "parametric gradient");
        Ok(())
    }

    /// `∂T(p)/∂θ` as a `3 × num_dofs` matrix, one adjoint pass per row.
    ///
    /// Columns of DOFs excluded by the options are zero.
    pub fn jacobian_dofs(&self, p: &Point3, t0: f64, t1: f64) -> Result<DMatrix<f64>> {
        let n = self.transform.num_dofs();
        self.transform.check_gradient_support()?;
        let point_gradient = self.transform.point_gradient(None, t0, t1)?;
        let mask = self.dof_mask()?;
        let mut jacobian = DMatrix::zeros(3, n);
        let mut scratch = Trajectory::new();
        let mut row = vec![0.0; n];
        for r in 0..3 {
            row.fill(0.0);
            let mut unit = Vector3::zeros();
            unit[r] = 1.0;
            point_gradient.accumulate(p, &unit, &mut row, &mut scratch)?;
            for (j, value) in row.iter().enumerate() {
                if mask[j] {
                    jacobian[(r, j)] = *value;
                }
            }
        }
        if !jacobian.iter().all(|v| v.is_finite()) {
            return Err(TransformError::divergence(0, p));
        }
        Ok(jacobian)
    }
}
