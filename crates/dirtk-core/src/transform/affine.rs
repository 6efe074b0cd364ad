//! Affine transform implementation.
//!
//! Rotation, shearing and anisotropic scaling about a fixed center, plus
//! translation. The parameterization extends [`RigidTransform`]'s, so the
//! first six DOFs have the same meaning in both.
//!
//! [`RigidTransform`]: super::rigid::RigidTransform

use super::global::{GlobalGradient, GlobalParameters, AFFINE_DOFS};
use super::rigid::RigidTransform;
use super::trait_::{PointGradient, SpatialTransform};
use crate::error::Result;
use crate::image::ImageDomain;
use crate::integration::Inversion;
use crate::lattice::DofStatus;
use crate::spatial::{Matrix3, Matrix4, Point3, Vector3};

/// Affine transform with DOFs
/// `[tx, ty, tz, rx, ry, rz, sx, sy, sz, sxy, syz, sxz]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform {
    params: GlobalParameters,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity(Point3::origin())
    }
}

impl AffineTransform {
    pub fn identity(center: Point3) -> Self {
        Self {
            params: GlobalParameters::identity(AFFINE_DOFS, center),
        }
    }

    /// Create from translation, Euler angles, scales and shears
    /// `(sxy, syz, sxz)`.
    pub fn new(translation: Vector3, rotation: Vector3, scale: Vector3, shear: Vector3, center: Point3) -> Self {
        let mut affine = Self::identity(center);
        affine.params.put_vector(0, &translation);
        affine.params.put_vector(3, &rotation);
        affine.params.put_vector(6, &scale);
        affine.params.put_vector(9, &shear);
        affine
    }

    /// Same mapping as `rigid`, with unit scales and no shear.
    pub fn from_rigid(rigid: &RigidTransform) -> Self {
        Self {
            params: rigid.parameters().widened(AFFINE_DOFS),
        }
    }

    pub fn center(&self) -> &Point3 {
        self.params.center()
    }

    pub fn translation(&self) -> Vector3 {
        self.params.translation()
    }

    /// Linear part `R · Sh · S`.
    pub fn linear(&self) -> Matrix3 {
        self.params.linear()
    }

    pub fn matrix(&self) -> Matrix4 {
        self.params.matrix()
    }

    /// Reset to the identity mapping, keeping the center and DOF status.
    pub fn reset(&mut self) {
        self.params.reset();
    }

    pub fn set_all_status(&mut self, status: DofStatus) {
        self.params.set_all_status(status);
    }
}

impl SpatialTransform for AffineTransform {
    fn num_dofs(&self) -> usize {
        AFFINE_DOFS
    }

    fn get(&self, dof: usize) -> Result<f64> {
        self.params.get(dof)
    }

    fn put(&mut self, dof: usize, value: f64) -> Result<()> {
        self.params.put(dof, value)
    }

    fn status(&self, dof: usize) -> Result<DofStatus> {
        self.params.status(dof)
    }

    fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()> {
        self.params.set_status(dof, status)
    }

    fn version(&self) -> u64 {
        self.params.version()
    }

    fn transform(&self, p: &Point3, _t0: f64, _t1: f64) -> Result<Point3> {
        Ok(self.params.apply(p))
    }

    fn inverse(&self, p: &Point3, _t0: f64, _t1: f64) -> Result<Inversion> {
        Ok(self.params.invert(p))
    }

    fn point_gradient(&self, _domain: Option<&ImageDomain>, _t0: f64, _t1: f64) -> Result<Box<dyn PointGradient + '_>> {
        Ok(Box::new(GlobalGradient { params: &self.params }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_affine() {
        let affine = AffineTransform::default();
        assert_eq!(affine.matrix(), Matrix4::identity());
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(affine.transform(&p, 0.0, 1.0).unwrap(), p);
    }

    #[test]
    fn test_scaling_about_center() {
        let center = Point3::new(10.0, 0.0, 0.0);
        let affine = AffineTransform::new(
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::new(2.0, 1.0, 0.5),
            Vector3::zeros(),
            center,
        );
        let q = affine.transform(&Point3::new(11.0, 2.0, 4.0), 0.0, 1.0).unwrap();
        assert!((q - Point3::new(12.0, 2.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn test_from_rigid_preserves_mapping() {
        let rigid = RigidTransform::new(Vector3::new(1.0, 0.0, -1.0), Vector3::new(0.2, 0.1, -0.3), Point3::new(1.0, 2.0, 3.0));
        let affine = AffineTransform::from_rigid(&rigid);
        let p = Point3::new(-4.0, 0.5, 2.0);
        let a = affine.transform(&p, 0.0, 1.0).unwrap();
        let r = rigid.transform(&p, 0.0, 1.0).unwrap();
        assert!((a - r).norm() < 1e-12);
    }

    #[test]
    fn test_singular_affine_inverse_fails() {
        let affine = AffineTransform::new(
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 1.0),
            Vector3::zeros(),
            Point3::origin(),
        );
        let inv = affine.inverse(&Point3::new(1.0, 1.0, 1.0), 0.0, 1.0).unwrap();
        assert!(!inv.converged);
    }
}
