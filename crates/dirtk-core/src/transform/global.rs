//! Parameter block shared by the rigid and affine transformations.
//!
//! Parameters, in DOF order: translations `tx, ty, tz` (mm), rotations
//! `rx, ry, rz` (radians), scales `sx, sy, sz` and shears `sxy, syz, sxz`.
//! The mapping is `T(x) = A (x - c) + c + t` with `A = R · Sh · S`,
//! `R = Rz · Ry · Rx`, `Sh = [[1, sxy, sxz], [0, 1, syz], [0, 0, 1]]` and
//! `S = diag(sx, sy, sz)`. Rigid transformations expose the first six.

use super::trait_::PointGradient;
use crate::error::{check_dof, Result};
use crate::integration::{Inversion, Trajectory};
use crate::lattice::DofStatus;
use crate::spatial::{homogeneous, Matrix3, Matrix4, Point3, Vector3};

pub const RIGID_DOFS: usize = 6;
pub const AFFINE_DOFS: usize = 12;

const IDENTITY: [f64; AFFINE_DOFS] = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GlobalParameters {
    params: [f64; AFFINE_DOFS],
    status: Vec<DofStatus>,
    center: Point3,
    version: u64,
}

fn rot_x(a: f64) -> (Matrix3, Matrix3) {
    let (s, c) = a.sin_cos();
    (
        Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c),
        Matrix3::new(0.0, 0.0, 0.0, 0.0, -s, -c, 0.0, c, -s),
    )
}

fn rot_y(b: f64) -> (Matrix3, Matrix3) {
    let (s, c) = b.sin_cos();
    (
        Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c),
        Matrix3::new(-s, 0.0, c, 0.0, 0.0, 0.0, -c, 0.0, -s),
    )
}

fn rot_z(g: f64) -> (Matrix3, Matrix3) {
    let (s, c) = g.sin_cos();
    (
        Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0),
        Matrix3::new(-s, -c, 0.0, c, -s, 0.0, 0.0, 0.0, 0.0),
    )
}

impl GlobalParameters {
    pub fn identity(num_dofs: usize, center: Point3) -> Self {
        Self {
            params: IDENTITY,
            status: vec![DofStatus::Active; num_dofs],
            center,
            version: 0,
        }
    }

    /// Same parameters exposing `num_dofs` DOFs; new DOFs are active.
    pub fn widened(&self, num_dofs: usize) -> Self {
        let mut status = self.status.clone();
        status.resize(num_dofs, DofStatus::Active);
        Self {
            params: self.params,
            status,
            center: self.center,
            version: 0,
        }
    }

    /// Write three consecutive parameters starting at `first`.
    pub fn put_vector(&mut self, first: usize, values: &Vector3) {
        self.params[first..first + 3].copy_from_slice(values.as_slice());
        self.version += 1;
    }

    pub fn num_dofs(&self) -> usize {
        self.status.len()
    }

    pub fn center(&self) -> &Point3 {
        &self.center
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, dof: usize) -> Result<f64> {
        check_dof(dof, self.num_dofs())?;
        Ok(self.params[dof])
    }

    pub fn put(&mut self, dof: usize, value: f64) -> Result<()> {
        check_dof(dof, self.num_dofs())?;
        self.params[dof] = value;
        self.version += 1;
        Ok(())
    }

    pub fn status(&self, dof: usize) -> Result<DofStatus> {
        check_dof(dof, self.num_dofs())?;
        Ok(self.status[dof])
    }

    pub fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()> {
        check_dof(dof, self.num_dofs())?;
        self.status[dof] = status;
        Ok(())
    }

    pub fn set_all_status(&mut self, status: DofStatus) {
        self.status.fill(status);
    }

    /// Back to the identity mapping; the center is kept.
    pub fn reset(&mut self) {
        self.params = IDENTITY;
        self.version += 1;
    }

    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.params[0], self.params[1], self.params[2])
    }

    pub fn rotation(&self) -> Matrix3 {
        rot_z(self.params[5]).0 * rot_y(self.params[4]).0 * rot_x(self.params[3]).0
    }

    fn shear(&self) -> Matrix3 {
        let [sxy, syz, sxz] = [self.params[9], self.params[10], self.params[11]];
        Matrix3::new(1.0, sxy, sxz, 0.0, 1.0, syz, 0.0, 0.0, 1.0)
    }

    fn scale(&self) -> Matrix3 {
        Matrix3::from_diagonal(&Vector3::new(self.params[6], self.params[7], self.params[8]))
    }

    /// Linear part `A = R · Sh · S`.
    pub fn linear(&self) -> Matrix3 {
        self.rotation() * self.shear() * self.scale()
    }

    /// Homogeneous matrix of the mapping.
    pub fn matrix(&self) -> Matrix4 {
        let a = self.linear();
        let offset = self.center.coords + self.translation() - a * self.center.coords;
        homogeneous(&a, &offset)
    }

    pub fn apply(&self, p: &Point3) -> Point3 {
        self.center + self.linear() * (p - self.center) + self.translation()
    }

    pub fn invert(&self, p: &Point3) -> Inversion {
        match self.linear().try_inverse() {
            Some(inv) => Inversion::exact(self.center + inv * (p - self.center - self.translation())),
            None => Inversion {
                point: *p,
                converged: false,
                iterations: 0,
            },
        }
    }

    /// `∂T(p)/∂θ_j` for every exposed DOF `j`.
    pub fn dof_derivatives(&self, p: &Point3) -> [Vector3; AFFINE_DOFS] {
        let r = &self.params;
        let (rx, drx) = rot_x(r[3]);
        let (ry, dry) = rot_y(r[4]);
        let (rz, drz) = rot_z(r[5]);
        let rotation = rz * ry * rx;
        let shear = self.shear();
        let scale = self.scale();
        let shear_scale = shear * scale;
        let q = p - self.center;

        let mut out = [Vector3::zeros(); AFFINE_DOFS];
        out[0] = Vector3::x();
        out[1] = Vector3::y();
        out[2] = Vector3::z();
        out[3] = rz * ry * drx * shear_scale * q;
        out[4] = rz * dry * rx * shear_scale * q;
        out[5] = drz * ry * rx * shear_scale * q;
        if self.num_dofs() > RIGID_DOFS {
            let rs = rotation * shear;
            for axis in 0..3 {
                out[6 + axis] = rs.column(axis) * q[axis];
            }
            // Shear derivatives: ∂Sh/∂sxy = e0 e1ᵀ, ∂Sh/∂syz = e1 e2ᵀ, ∂Sh/∂sxz = e0 e2ᵀ.
            let sq = scale * q;
            out[9] = rotation.column(0) * sq.y;
            out[10] = rotation.column(1) * sq.z;
            out[11] = rotation.column(0) * sq.z;
        }
        out
    }
}

/// Analytic chain rule for rigid and affine parameters.
pub(crate) struct GlobalGradient<'a> {
    pub params: &'a GlobalParameters,
}

impl PointGradient for GlobalGradient<'_> {
    fn accumulate(&self, p: &Point3, g: &Vector3, grad: &mut [f64], _scratch: &mut Trajectory) -> Result<()> {
        let derivatives = self.params.dof_derivatives(p);
        for (j, d) in derivatives.iter().take(self.params.num_dofs()).enumerate() {
            grad[j] += g.dot(d);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GlobalParameters {
        let mut params = GlobalParameters::identity(AFFINE_DOFS, Point3::new(1.0, -2.0, 0.5));
        let values = [1.5, -0.5, 2.0, 0.1, -0.2, 0.3, 1.1, 0.9, 1.05, 0.05, -0.03, 0.02];
        for (dof, v) in values.iter().enumerate() {
            params.put(dof, *v).unwrap();
        }
        params
    }

    #[test]
    fn test_matrix_agrees_with_apply() {
        let params = sample();
        let p = Point3::new(3.0, 4.0, -1.0);
        let m = params.matrix();
        let via_matrix = crate::spatial::apply_homogeneous(&m, &p);
        assert!((via_matrix - params.apply(&p)).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_order() {
        let mut params = GlobalParameters::identity(RIGID_DOFS, Point3::origin());
        params.put(5, std::f64::consts::FRAC_PI_2).unwrap();
        let q = params.apply(&Point3::new(1.0, 0.0, 0.0));
        assert!((q - Point3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_dof_derivatives_match_finite_difference() {
        let params = sample();
        let p = Point3::new(-2.0, 1.0, 3.0);
        let analytic = params.dof_derivatives(&p);
        let eps = 1e-6;
        for dof in 0..AFFINE_DOFS {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus.put(dof, params.get(dof).unwrap() + eps).unwrap();
            minus.put(dof, params.get(dof).unwrap() - eps).unwrap();
            let fd = (plus.apply(&p) - minus.apply(&p)) / (2.0 * eps);
            assert!((fd - analytic[dof]).norm() < 1e-7, "dof {dof}: {fd:?} vs {:?}", analytic[dof]);
        }
    }

    #[test]
    fn test_invert() {
        let params = sample();
        let p = Point3::new(0.2, 0.4, 0.6);
        let inv = params.invert(&params.apply(&p));
        assert!(inv.converged);
        assert!((inv.point - p).norm() < 1e-12);
    }
}
