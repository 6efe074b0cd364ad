//! Diffusion (membrane) energy of a displacement field.
//!
//! R(d) = ½ Σ_axes Σ_voxels ((d[i+1] − d[i]) / s_axis)²
//!
//! with forward differences along each image axis. Evaluated on a burn
//! backend over the `[3, nz, ny, nx]` tensor layout of the field.

use std::ops::Range;

use burn::tensor::{backend::Backend, ElementConversion, Tensor};
use dirtk_core::{DisplacementField, GradientImage, VectorImage};

use super::trait_::EnergyTerm;
use crate::error::Result;
use crate::validation::validate_tensor;

/// First-order smoothness penalty on the displacement.
#[derive(Debug, Clone)]
pub struct DiffusionEnergy<B: Backend> {
    weight: f64,
    device: B::Device,
}

impl<B: Backend> DiffusionEnergy<B> {
    pub fn new(weight: f64, device: B::Device) -> Self {
        Self { weight, device }
    }

    /// Forward differences along tensor axis `axis` (1 = z, 2 = y, 3 = x),
    /// scaled by the voxel spacing along that axis.
    fn differences(&self, field: &Tensor<B, 4>, axis: usize, spacing: f64) -> Option<Tensor<B, 4>> {
        let dims = field.dims();
        let n = dims[axis];
        if n < 2 {
            return None;
        }
        let upper = field.clone().slice(ranges(dims, axis, 1..n));
        let lower = field.clone().slice(ranges(dims, axis, 0..n - 1));
        Some((upper - lower).div_scalar(spacing))
    }
}

impl<B: Backend> Default for DiffusionEnergy<B> {
    fn default() -> Self {
        Self::new(0.01, Default::default())
    }
}

/// Full ranges over `dims` with `axis` restricted to `range`.
fn ranges(dims: [usize; 4], axis: usize, range: Range<usize>) -> [Range<usize>; 4] {
    let mut out = dims.map(|d| 0..d);
    out[axis] = range;
    out
}

/// Spacing along tensor axis `axis` of `field`.
fn axis_spacing(field: &DisplacementField, axis: usize) -> f64 {
    field.domain().spacing()[3 - axis]
}

impl<B: Backend> EnergyTerm for DiffusionEnergy<B> {
    fn name(&self) -> &str {
        "DiffusionEnergy"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn evaluate(&self, displacement: &DisplacementField) -> Result<f64> {
        let field = displacement.to_tensor::<B>(&self.device);
        let mut total = 0.0;
        for axis in 1..4 {
            if let Some(diff) = self.differences(&field, axis, axis_spacing(displacement, axis)) {
                total += diff.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
            }
        }
        Ok(0.5 * total)
    }

    fn non_parametric_gradient(&self, displacement: &DisplacementField) -> Result<GradientImage> {
        let field = displacement.to_tensor::<B>(&self.device);
        let dims = field.dims();
        let mut gradient = Tensor::<B, 4>::zeros(dims, &self.device);
        for axis in 1..4 {
            let spacing = axis_spacing(displacement, axis);
            let Some(diff) = self.differences(&field, axis, spacing) else {
                continue;
            };
            // ∂/∂d[i] of ½(d[i+1] − d[i])² and ½(d[i] − d[i−1])²
            let diff = diff.div_scalar(spacing);
            let mut pad = dims;
            pad[axis] = 1;
            let zeros = Tensor::<B, 4>::zeros(pad, &self.device);
            let backward = Tensor::cat(vec![diff.clone().neg(), zeros.clone()], axis);
            let forward = Tensor::cat(vec![zeros, diff], axis);
            gradient = gradient + backward + forward;
        }
        validate_tensor(&gradient, "diffusion gradient")?;
        Ok(VectorImage::from_tensor(gradient, displacement.domain().clone())?)
    }
}
