//! Newton search for the preimage of a point under a smooth map.

use tracing::warn;

use crate::error::Result;
use crate::spatial::{is_finite_vector, Matrix3, Point3};

/// Outcome of an inverse search. A failed search is a value, not an error:
/// the caller decides whether to retry from another guess.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inversion {
    /// Best preimage estimate found.
    pub point: Point3,
    pub converged: bool,
    pub iterations: usize,
}

impl Inversion {
    pub fn exact(point: Point3) -> Self {
        Self {
            point,
            converged: true,
            iterations: 0,
        }
    }
}

/// Solve `map(x) = target` by Newton iteration from `guess`.
///
/// `map` returns the image and its spatial Jacobian. Errors from `map`
/// propagate; a singular Jacobian or exhausted iteration budget yields an
/// unconverged [`Inversion`] holding the last iterate.
pub fn newton_inverse<M>(
    target: &Point3,
    guess: Point3,
    tolerance: f64,
    max_iterations: usize,
    mut map: M,
) -> Result<Inversion>
where
    M: FnMut(&Point3) -> Result<(Point3, Matrix3)>,
{
    let mut x = guess;
    for iteration in 0..=max_iterations {
        let (image, jacobian) = map(&x)?;
        let residual = image - target;
        if residual.norm() <= tolerance {
            return Ok(Inversion {
                point: x,
                converged: true,
                iterations: iteration,
            });
        }
        if iteration == max_iterations {
            break;
        }
        let Some(inv) = jacobian.try_inverse() else {
            warn!(?target, iteration, "inverse search hit a singular Jacobian");
            return Ok(Inversion {
                point: x,
                converged: false,
                iterations: iteration,
            });
        };
        let next = x - inv * residual;
        if !is_finite_vector(&next.coords) {
            break;
        }
        x = next;
    }
    warn!(?target, max_iterations, "inverse search did not converge");
    Ok(Inversion {
        point: x,
        converged: false,
        iterations: max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Vector3;

    #[test]
    fn test_newton_inverts_smooth_map() {
        let map = |p: &Point3| {
            let image = Point3::new(p.x + 0.1 * p.y.sin(), p.y + 0.2 * p.x * p.x, p.z);
            let jacobian = Matrix3::new(1.0, 0.1 * p.y.cos(), 0.0, 0.4 * p.x, 1.0, 0.0, 0.0, 0.0, 1.0);
            Ok((image, jacobian))
        };
        let x = Point3::new(0.3, -0.4, 2.0);
        let (y, _) = map(&x).unwrap();
        let inv = newton_inverse(&y, y, 1e-12, 20, map).unwrap();
        assert!(inv.converged);
        assert!((inv.point - x).norm() < 1e-10);
    }

    #[test]
    fn test_singular_jacobian_reports_failure() {
        let map = |p: &Point3| Ok((Point3::new(p.x, 0.0, 0.0), Matrix3::from_diagonal(&Vector3::new(1.0, 0.0, 0.0))));
        let inv = newton_inverse(&Point3::new(1.0, 1.0, 0.0), Point3::origin(), 1e-10, 10, map).unwrap();
        assert!(!inv.converged);
    }
}
