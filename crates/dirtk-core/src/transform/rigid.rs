//! Rigid transform implementation.
//!
//! Rotation about a fixed center plus translation: `T(x) = R(x - c) + c + t`
//! with Euler angles in the ZYX convention, `R = Rz · Ry · Rx`.

use super::global::{GlobalGradient, GlobalParameters, RIGID_DOFS};
use super::trait_::{PointGradient, SpatialTransform};
use crate::error::Result;
use crate::image::ImageDomain;
use crate::integration::Inversion;
use crate::lattice::DofStatus;
use crate::spatial::{Matrix3, Matrix4, Point3, Vector3};

/// Rigid transform with DOFs `[tx, ty, tz, rx, ry, rz]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidTransform {
    params: GlobalParameters,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity(Point3::origin())
    }
}

impl RigidTransform {
    /// Identity rigid transform rotating about `center`.
    pub fn identity(center: Point3) -> Self {
        Self {
            params: GlobalParameters::identity(RIGID_DOFS, center),
        }
    }

    /// Create from a translation (mm) and Euler angles (radians).
    pub fn new(translation: Vector3, rotation: Vector3, center: Point3) -> Self {
        let mut rigid = Self::identity(center);
        rigid.params.put_vector(0, &translation);
        rigid.params.put_vector(3, &rotation);
        rigid
    }

    pub fn center(&self) -> &Point3 {
        self.params.center()
    }

    pub fn translation(&self) -> Vector3 {
        self.params.translation()
    }

    pub fn rotation(&self) -> Matrix3 {
        self.params.rotation()
    }

    pub fn matrix(&self) -> Matrix4 {
        self.params.matrix()
    }

    pub(crate) fn parameters(&self) -> &GlobalParameters {
        &self.params
    }
}

impl SpatialTransform for RigidTransform {
    fn num_dofs(&self) -> usize {
        RIGID_DOFS
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
