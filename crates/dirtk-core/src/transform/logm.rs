//! Principal logarithm of homogeneous matrices.
//!
//! Inverse scaling and squaring: take square roots (Denman-Beavers) until
//! the matrix is close to the identity, sum the series of `log(I + E)` and
//! scale back by `2^k`. The exponential is nalgebra's Padé implementation.

use crate::error::{Result, TransformError};
use crate::spatial::Matrix4;

const SERIES_RADIUS: f64 = 0.1;
const MAX_SQUARE_ROOTS: usize = 40;
const MAX_DB_ITERATIONS: usize = 60;
const MAX_SERIES_TERMS: usize = 100;

/// Principal matrix logarithm.
///
/// Fails for matrices without a real principal logarithm (singular, or with
/// eigenvalues on the negative real axis).
pub fn logm(a: &Matrix4) -> Result<Matrix4> {
    if !a.iter().all(|v| v.is_finite()) {
        return Err(TransformError::configuration("matrix logarithm of non-finite matrix"));
    }
    let identity = Matrix4::identity();
    let mut x = *a;
    let mut roots = 0;
    while (x - identity).norm() > SERIES_RADIUS {
        if roots == MAX_SQUARE_ROOTS {
            return Err(TransformError::configuration("matrix has no real principal logarithm"));
        }
        x = sqrtm(&x)?;
        roots += 1;
    }

    let e = x - identity;
    let mut power = e;
    let mut sum = Matrix4::zeros();
    for n in 1..=MAX_SERIES_TERMS {
        let term = power / n as f64;
        if n % 2 == 1 {
            sum += term;
        } else {
            sum -= term;
        }
        if term.norm() < 1e-18 {
            break;
        }
        power *= e;
    }
    Ok(sum * f64::powi(2.0, roots as i32))
}

/// Matrix exponential.
pub fn expm(a: &Matrix4) -> Matrix4 {
    a.exp()
}

/// Principal square root by the Denman-Beavers iteration.
fn sqrtm(a: &Matrix4) -> Result<Matrix4> {
    let singular = || TransformError::configuration("matrix has no real principal logarithm (singular square root)");
    let mut y = *a;
    let mut z = Matrix4::identity();
    for _ in 0..MAX_DB_ITERATIONS {
        let y_inv = y.try_inverse().ok_or_else(singular)?;
        let z_inv = z.try_inverse().ok_or_else(singular)?;
        let next_y = (y + z_inv) * 0.5;
        let next_z = (z + y_inv) * 0.5;
        let delta = (next_y - y).norm();
        y = next_y;
        z = next_z;
        if delta <= 1e-15 * y.norm() {
            return Ok(y);
        }
    }
    if y.iter().all(|v| v.is_finite()) && (y * y - a).norm() <= 1e-10 * a.norm() {
        Ok(y)
    } else {
        Err(singular())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{homogeneous, Matrix3, Vector3};

    #[test]
    fn test_log_of_identity_is_zero() {
        assert!(logm(&Matrix4::identity()).unwrap().norm() < 1e-15);
    }

    #[test]
    fn test_log_of_translation() {
        let m = homogeneous(&Matrix3::identity(), &Vector3::new(3.0, -1.0, 2.0));
        let l = logm(&m).unwrap();
        assert!((l[(0, 3)] - 3.0).abs() < 1e-10);
        assert!((l[(1, 3)] + 1.0).abs() < 1e-10);
        assert!(l.fixed_view::<3, 3>(0, 0).norm() < 1e-10);
    }

    #[test]
    fn test_exp_log_round_trip() {
        let rotation = nalgebra::Rotation3::from_euler_angles(0.4, -0.3, 1.2).into_inner();
        let linear = rotation * Matrix3::new(1.2, 0.1, 0.0, 0.0, 0.8, 0.05, 0.0, 0.0, 1.1);
        let m = homogeneous(&linear, &Vector3::new(5.0, -3.0, 12.0));
        let l = logm(&m).unwrap();
        assert!((expm(&l) - m).norm() < 1e-9 * m.norm());
        assert!(l.row(3).norm() < 1e-10);
    }

    #[test]
    fn test_singular_matrix_has_no_log() {
        let m = homogeneous(&Matrix3::from_diagonal(&Vector3::new(1.0, 0.0, 1.0)), &Vector3::zeros());
        assert!(logm(&m).is_err());
    }
}
