//! Dense vector images: displacement fields and non-parametric gradients.
//!
//! A vector image stores one 3-vector per voxel of an [`ImageDomain`].
//! Conversions to and from burn tensors use the `[3, nz, ny, nx]` layout.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use rayon::prelude::*;

use super::domain::ImageDomain;
use crate::error::{Result, TransformError};
use crate::spatial::{is_finite_vector, Point3, Vector3};

/// Dense 3-vector image bound to a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorImage {
    domain: ImageDomain,
    data: Vec<Vector3>,
}

/// Displacement `φ(x) - x` sampled at every voxel of a domain.
pub type DisplacementField = VectorImage;

/// Derivative of an energy with respect to the displaced position of every voxel.
pub type GradientImage = VectorImage;

impl VectorImage {
    /// Wrap per-voxel vectors. The length must match the domain.
    pub fn new(domain: ImageDomain, data: Vec<Vector3>) -> Result<Self> {
        if data.len() != domain.num_voxels() {
            return Err(TransformError::ShapeMismatch {
                expected: vec![domain.num_voxels()],
                actual: vec![data.len()],
            });
        }
        Ok(Self { domain, data })
    }

    /// Zero vector image.
    pub fn zeros(domain: ImageDomain) -> Self {
        let n = domain.num_voxels();
        Self {
            domain,
            data: vec![Vector3::zeros(); n],
        }
    }

    /// Fill by evaluating `f` at the world coordinate of each voxel.
    pub fn from_world_fn<F>(domain: ImageDomain, f: F) -> Self
    where
        F: Fn(&Point3) -> Vector3 + Sync,
    {
        let data = (0..domain.num_voxels())
            .into_par_iter()
            .map(|v| f(&domain.voxel_to_world(v)))
            .collect();
        Self { domain, data }
    }

    pub fn domain(&self) -> &ImageDomain {
        &self.domain
    }

    pub fn data(&self) -> &[Vector3] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Vector3] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector at voxel `(i, j, k)`.
    pub fn at(&self, i: usize, j: usize, k: usize) -> Vector3 {
        self.data[self.domain.linear_index(i, j, k)]
    }

    /// Largest vector norm.
    pub fn max_norm(&self) -> f64 {
        self.data.iter().map(|v| v.norm()).fold(0.0, f64::max)
    }

    /// First voxel holding a non-finite component, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.data.iter().position(|v| !is_finite_vector(v))
    }

    /// Trilinear sample at a continuous index, clamping to the border voxels.
    pub fn sample_linear(&self, index: &Point3) -> Vector3 {
        let size = self.domain.size();
        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for a in 0..3 {
            let max = (size[a] - 1) as f64;
            let u = index[a].clamp(0.0, max);
            let f = u.floor();
            let b = (f as usize).min(size[a].saturating_sub(2));
            base[a] = b;
            frac[a] = if size[a] == 1 { 0.0 } else { u - b as f64 };
        }
        let mut value = Vector3::zeros();
        for dk in 0..2 {
            let wz = if dk == 0 { 1.0 - frac[2] } else { frac[2] };
            if wz == 0.0 {
                continue;
            }
            let k = (base[2] + dk).min(size[2] - 1);
            for dj in 0..2 {
                let wy = if dj == 0 { 1.0 - frac[1] } else { frac[1] };
                if wy == 0.0 {
                    continue;
                }
                let j = (base[1] + dj).min(size[1] - 1);
                for di in 0..2 {
                    let wx = if di == 0 { 1.0 - frac[0] } else { frac[0] };
                    if wx == 0.0 {
                        continue;
                    }
                    let i = (base[0] + di).min(size[0] - 1);
                    value += self.at(i, j, k) * (wx * wy * wz);
                }
            }
        }
        value
    }

    /// Convert to a tensor of shape `[3, nz, ny, nx]`.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let n = self.data.len();
        let mut values = Vec::with_capacity(3 * n);
        for c in 0..3 {
            values.extend(self.data.iter().map(|v| v[c] as f32));
        }
        let data = TensorData::new(values, Shape::new(self.domain.tensor_shape()));
        Tensor::<B, 4>::from_data(data, device)
    }

    /// Build from a tensor of shape `[3, nz, ny, nx]` aligned with `domain`.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>, domain: ImageDomain) -> Result<Self> {
        let dims = tensor.dims();
        let expected = domain.tensor_shape();
        if dims != expected {
            return Err(TransformError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: dims.to_vec(),
            });
        }
        let values = tensor
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .map_err(|e| TransformError::tensor(format!("{e:?}")))?;
        let n = domain.num_voxels();
        let data = (0..n)
            .map(|v| Vector3::new(values[v], values[n + v], values[2 * n + v]))
            .collect();
        Ok(Self { domain, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn domain() -> ImageDomain {
        ImageDomain::axis_aligned([3, 4, 5], Point3::origin(), Vector3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_length_checked() {
        let result = VectorImage::new(domain(), vec![Vector3::zeros(); 7]);
        assert!(matches!(result, Err(TransformError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_sample_linear_reproduces_affine_field() {
        let field = VectorImage::from_world_fn(domain(), |p| {
            Vector3::new(2.0 * p.x + 1.0, p.y - p.z, 0.5 * p.z)
        });
        let q = Point3::new(1.25, 2.5, 3.75);
        let v = field.sample_linear(&q);
        assert!((v - Vector3::new(3.5, -1.25, 1.875)).norm() < 1e-12);
    }

    #[test]
    fn test_sample_linear_clamps_outside() {
        let field = VectorImage::from_world_fn(domain(), |p| Vector3::new(p.x, 0.0, 0.0));
        let v = field.sample_linear(&Point3::new(10.0, 1.0, 1.0));
        assert!((v.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tensor_layout() {
        let device = Default::default();
        let field = VectorImage::from_world_fn(domain(), |p| Vector3::new(p.x, p.y, p.z));
        let tensor = field.to_tensor::<TestBackend>(&device);
        assert_eq!(tensor.dims(), [3, 5, 4, 3]);

        let back = VectorImage::from_tensor(tensor, domain()).unwrap();
        assert_eq!(back.at(2, 3, 4), Vector3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_tensor_shape_mismatch() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::zeros([3, 2, 2, 2], &device);
        let result = VectorImage::from_tensor(tensor, domain());
        assert!(matches!(result, Err(TransformError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_non_finite_detection() {
        let mut field = VectorImage::zeros(domain());
        assert!(field.first_non_finite().is_none());
        field.data_mut()[7] = Vector3::new(0.0, f64::INFINITY, 0.0);
        assert_eq!(field.first_non_finite(), Some(7));
    }
}
