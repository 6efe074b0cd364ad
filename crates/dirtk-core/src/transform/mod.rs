//! Transform types and operations.
//!
//! Every variant implements [`SpatialTransform`]; [`Transformation`] is the
//! closed sum over all of them and adds the operations built on top of the
//! shared contract (DOF Jacobians, parametric gradients, batched tensors).

pub mod trait_;
mod global;
pub mod rigid;
pub mod affine;
pub mod logm;
mod flow;
pub mod ffd;
pub mod svffd;
pub mod temporal;
pub mod multilevel;

pub use trait_::{PointGradient, SpatialTransform};
pub use global::{AFFINE_DOFS, RIGID_DOFS};
pub use rigid::RigidTransform;
pub use affine::AffineTransform;
pub use logm::{expm, logm};
pub use ffd::{BSplineFfd, FreeFormTransform, LinearFfd};
pub use svffd::Svffd;
pub use temporal::TemporalDiffeomorphicFfd;
pub use multilevel::MultiLevelSvffd;

use std::fmt;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};
use crate::gradient::{AdjointGradientEngine, GradientOptions};
use crate::image::{world_points_tensor, DisplacementField, GradientImage, ImageDomain};
use crate::integration::Inversion;
use crate::lattice::DofStatus;
use crate::spatial::Point3;

/// Variant tag of a [`Transformation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Rigid,
    Affine,
    LinearFfd,
    BSplineFfd,
    Svffd,
    TemporalDiffeomorphicFfd,
    MultiLevelSvffd,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rigid => "rigid",
            Self::Affine => "affine",
            Self::LinearFfd => "linear FFD",
            Self::BSplineFfd => "B-spline FFD",
            Self::Svffd => "SVFFD",
            Self::TemporalDiffeomorphicFfd => "TD-FFD",
            Self::MultiLevelSvffd => "multi-level SVFFD",
        };
        f.write_str(name)
    }
}

/// Any supported transformation.
#[derive(Debug, Clone)]
pub enum Transformation {
    Rigid(RigidTransform),
    Affine(AffineTransform),
    LinearFfd(LinearFfd),
    BSplineFfd(BSplineFfd),
    Svffd(Svffd),
    Temporal(TemporalDiffeomorphicFfd),
    MultiLevel(MultiLevelSvffd),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            Transformation::Rigid($t) => $body,
            Transformation::Affine($t) => $body,
            Transformation::LinearFfd($t) => $body,
            Transformation::BSplineFfd($t) => $body,
            Transformation::Svffd($t) => $body,
            Transformation::Temporal($t) => $body,
            Transformation::MultiLevel($t) => $body,
        }
    };
}

impl Transformation {
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::Rigid(_) => TransformKind::Rigid,
            Self::Affine(_) => TransformKind::Affine,
            Self::LinearFfd(_) => TransformKind::LinearFfd,
            Self::BSplineFfd(_) => TransformKind::BSplineFfd,
            Self::Svffd(_) => TransformKind::Svffd,
            Self::Temporal(_) => TransformKind::TemporalDiffeomorphicFfd,
            Self::MultiLevel(_) => TransformKind::MultiLevelSvffd,
        }
    }

    /// All DOF values in DOF order.
    pub fn dofs(&self) -> Result<Vec<f64>> {
        (0..self.num_dofs()).map(|dof| self.get(dof)).collect()
    }

    /// All DOF status flags in DOF order.
    pub fn dof_status(&self) -> Result<Vec<DofStatus>> {
        (0..self.num_dofs()).map(|dof| self.status(dof)).collect()
    }

    /// `∂T(p)/∂θ` as a `3 × num_dofs` matrix.
    pub fn jacobian_dofs(&self, p: &Point3, t0: f64, t1: f64) -> Result<DMatrix<f64>> {
        AdjointGradientEngine::new(self).jacobian_dofs(p, t0, t1)
    }

    /// Accumulate `weight · Σ_voxels (∂d/∂θ)ᵀ · gradient[voxel]` into `out`
    /// for every active DOF.
    pub fn parametric_gradient(
        &self,
        gradient: &GradientImage,
        out: &mut [f64],
        weight: f64,
        t0: f64,
        t1: f64,
    ) -> Result<()> {
        AdjointGradientEngine::new(self).parametric_gradient(gradient, out, weight, t0, t1)
    }

    /// [`Transformation::parametric_gradient`] with explicit options.
    pub fn parametric_gradient_with(
        &self,
        options: GradientOptions,
        gradient: &GradientImage,
        out: &mut [f64],
        weight: f64,
        t0: f64,
        t1: f64,
    ) -> Result<()> {
        AdjointGradientEngine::new(self)
            .with_options(options)
            .parametric_gradient(gradient, out, weight, t0, t1)
    }

    /// Apply the transformation to a batch of points.
    ///
    /// `points` has shape `[N, 3]`; the result has the same shape.
    pub fn transform_points<B: Backend>(&self, points: Tensor<B, 2>, t0: f64, t1: f64) -> Result<Tensor<B, 2>> {
        let device = points.device();
        let dims = points.dims();
        if dims[1] != 3 {
            return Err(TransformError::ShapeMismatch {
                expected: vec![dims[0], 3],
                actual: dims.to_vec(),
            });
        }
        let values = points
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .map_err(|e| TransformError::tensor(format!("{e:?}")))?;
        let mapped = values
            .par_chunks_exact(3)
            .map(|c| self.transform(&Point3::new(c[0], c[1], c[2]), t0, t1))
            .collect::<Result<Vec<_>>>()?;
        let out: Vec<f64> = mapped.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        let data = TensorData::new(out, Shape::new([dims[0], 3]));
        Ok(Tensor::<B, 2>::from_data(data, &device))
    }

    /// Images of every voxel of `domain`, as an `[N, 3]` tensor in voxel
    /// order.
    pub fn transform_domain_points<B: Backend>(
        &self,
        domain: &ImageDomain,
        device: &B::Device,
        t0: f64,
        t1: f64,
    ) -> Result<Tensor<B, 2>> {
        self.transform_points(world_points_tensor::<B>(domain, device), t0, t1)
    }
}

impl SpatialTransform for Transformation {
    fn num_dofs(&self) -> usize {
        dispatch!(self, t => t.num_dofs())
    }

    fn get(&self, dof: usize) -> Result<f64> {
        dispatch!(self, t => t.get(dof))
    }

    fn put(&mut self, dof: usize, value: f64) -> Result<()> {
        dispatch!(self, t => t.put(dof, value))
    }

    fn status(&self, dof: usize) -> Result<DofStatus> {
        dispatch!(self, t => t.status(dof))
    }

    fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()> {
        dispatch!(self, t => t.set_status(dof, status))
    }

    fn version(&self) -> u64 {
        dispatch!(self, t => t.version())
    }

    fn transform(&self, p: &Point3, t0: f64, t1: f64) -> Result<Point3> {
        dispatch!(self, t => t.transform(p, t0, t1))
    }

    fn inverse(&self, p: &Point3, t0: f64, t1: f64) -> Result<Inversion> {
        dispatch!(self, t => t.inverse(p, t0, t1))
    }

    fn displacement(&self, domain: &ImageDomain, t0: f64, t1: f64) -> Result<Arc<DisplacementField>> {
        dispatch!(self, t => t.displacement(domain, t0, t1))
    }

    fn point_gradient(&self, domain: Option<&ImageDomain>, t0: f64, t1: f64) -> Result<Box<dyn PointGradient + '_>> {
        dispatch!(self, t => t.point_gradient(domain, t0, t1))
    }

    fn is_differentiable(&self, dof: usize) -> bool {
        dispatch!(self, t => t.is_differentiable(dof))
    }

    fn check_gradient_support(&self) -> Result<()> {
        dispatch!(self, t => t.check_gradient_support())
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Transformation {
                fn from(t: $ty) -> Self {
                    Self::$variant(t)
                }
            }
        )*
    };
}

impl_from_variant!(
    Rigid(RigidTransform),
    Affine(AffineTransform),
    LinearFfd(LinearFfd),
    BSplineFfd(BSplineFfd),
    Svffd(Svffd),
    Temporal(TemporalDiffeomorphicFfd),
    MultiLevel(MultiLevelSvffd),
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Vector3;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_transform_points_tensor() {
        let device = Default::default();
        let t: Transformation = RigidTransform::new(Vector3::new(1.0, 2.0, 3.0), Vector3::zeros(), Point3::origin()).into();
        let points = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]], &device);
        let mapped = t.transform_points(points, 0.0, 1.0).unwrap();
        let data = mapped.into_data().to_vec::<f32>().unwrap();
        assert_eq!(data, vec![1.0, 2.0, 3.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_transform_points_keeps_double_precision() {
        let device = Default::default();
        let shift = Vector3::new(0.123456789, -1e-9, 2.5e-7);
        let t: Transformation = RigidTransform::new(shift, Vector3::zeros(), Point3::origin()).into();
        let p = [1.0e6 + 0.25, 3.0e-8, -7.000000001];
        let points = Tensor::<NdArray<f64>, 2>::from_floats([p], &device);
        let mapped = t.transform_points(points, 0.0, 1.0).unwrap();
        let data = mapped.into_data().to_vec::<f64>().unwrap();
        let expected = t.transform(&Point3::new(p[0], p[1], p[2]), 0.0, 1.0).unwrap();
        assert_eq!(data, vec![expected.x, expected.y, expected.z]);
    }

    #[test]
    fn test_transform_domain_points_matches_displacement() {
        let device = Default::default();
        let domain = ImageDomain::axis_aligned([4, 3, 3], Point3::new(0.5, 0.0, -1.0), Vector3::new(0.75, 1.0, 1.25)).unwrap();
        let mut svffd = Svffd::covering(&domain, 1.5).unwrap();
        let node = svffd.lattice().node_index(1, 1, 1, 0);
        svffd.set_node_value(node, &Vector3::new(0.4, -0.2, 0.3)).unwrap();
        let t: Transformation = svffd.into();

        let mapped = t.transform_domain_points::<NdArray<f64>>(&domain, &device, 0.0, 1.0).unwrap();
        assert_eq!(mapped.dims(), [domain.num_voxels(), 3]);
        let data = mapped.into_data().to_vec::<f64>().unwrap();
        let displacement = t.displacement(&domain, 0.0, 1.0).unwrap();
        for (idx, d) in displacement.data().iter().enumerate() {
            let x = domain.voxel_to_world(idx);
            let y = Point3::new(data[3 * idx], data[3 * idx + 1], data[3 * idx + 2]);
            assert_eq!(y - x, *d, "voxel {idx}");
        }
    }

    #[test]
    fn test_transform_points_rejects_bad_shape() {
        let device = Default::default();
        let t: Transformation = AffineTransform::default().into();
        let points = Tensor::<TestBackend, 2>::zeros([4, 2], &device);
        assert!(matches!(t.transform_points(points, 0.0, 1.0), Err(TransformError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_kind_and_dofs() {
        let t: Transformation = AffineTransform::default().into();
        assert_eq!(t.kind(), TransformKind::Affine);
        assert_eq!(t.dofs().unwrap(), vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(t.kind().to_string(), "affine");
    }
}
