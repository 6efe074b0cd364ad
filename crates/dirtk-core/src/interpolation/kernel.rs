//! Separable interpolation kernels for control lattices.

/// Influence of one kernel axis on a continuous lattice coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSample {
    /// Index of the first node with non-zero support.
    pub first: i64,
    /// Number of nodes in the stencil (at most 4).
    pub len: usize,
    pub weights: [f64; 4],
    /// Derivatives of the weights with respect to the lattice coordinate.
    pub derivatives: [f64; 4],
}

/// One-dimensional kernel applied along each lattice axis.
///
/// Weights are non-negative and sum to one at every coordinate.
pub trait SeparableKernel: std::fmt::Debug + Default + Clone + Copy + Send + Sync + 'static {
    /// Short name used in logs and serialized records.
    const NAME: &'static str;

    /// Stencil for the continuous coordinate `u` (in node units).
    fn sample(u: f64) -> KernelSample;
}

/// Uniform cubic B-spline kernel (4-node support).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CubicBSpline;

/// Linear (hat) kernel (2-node support).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinearKernel;

impl CubicBSpline {
    /// Cubic B-spline basis functions for `u` in [0, 1).
    ///
    /// - B0 = (1-u)^3 / 6
    /// - B1 = (3u^3 - 6u^2 + 4) / 6
    /// - B2 = (-3u^3 + 3u^2 + 3u + 1) / 6
    /// - B3 = u^3 / 6
    pub fn basis(u: f64) -> [f64; 4] {
        let u2 = u * u;
        let u3 = u2 * u;
        let one_minus_u = 1.0 - u;
        [
            one_minus_u * one_minus_u * one_minus_u / 6.0,
            (3.0 * u3 - 6.0 * u2 + 4.0) / 6.0,
            (-3.0 * u3 + 3.0 * u2 + 3.0 * u + 1.0) / 6.0,
            u3 / 6.0,
        ]
    }

    /// First derivatives of [`CubicBSpline::basis`].
    pub fn basis_derivative(u: f64) -> [f64; 4] {
        let u2 = u * u;
        let one_minus_u = 1.0 - u;
        [
            -0.5 * one_minus_u * one_minus_u,
            1.5 * u2 - 2.0 * u,
            -1.5 * u2 + u + 0.5,
            0.5 * u2,
        ]
    }
}

impl SeparableKernel for CubicBSpline {
    const NAME: &'static str = "cubic_bspline";

    fn sample(u: f64) -> KernelSample {
        let cell = u.floor();
        let frac = u - cell;
        KernelSample {
            first: cell as i64 - 1,
            len: 4,
            weights: Self::basis(frac),
            derivatives: Self::basis_derivative(frac),
        }
    }
}

impl SeparableKernel for LinearKernel {
    const NAME: &'static str = "linear";

    fn sample(u: f64) -> KernelSample {
        let cell = u.floor();
        let frac = u - cell;
        KernelSample {
            first: cell as i64,
            len: 2,
            weights: [1.0 - frac, frac, 0.0, 0.0],
            derivatives: [-1.0, 1.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_partition_of_unity() {
        for &u in &[0.0, 0.1, 0.5, 0.77, 0.999] {
            let sum: f64 = CubicBSpline::basis(u).iter().sum();
            assert!((sum - 1.0).abs() < 1e-14);
            let dsum: f64 = CubicBSpline::basis_derivative(u).iter().sum();
            assert!(dsum.abs() < 1e-14);
        }
    }

    #[test]
    fn test_cubic_at_node() {
        // At an exact node the centre weight is 2/3 and the neighbours 1/6.
        let s = CubicBSpline::sample(2.0);
        assert_eq!(s.first, 1);
        assert!((s.weights[0] - 1.0 / 6.0).abs() < 1e-15);
        assert!((s.weights[1] - 2.0 / 3.0).abs() < 1e-15);
        assert!((s.weights[2] - 1.0 / 6.0).abs() < 1e-15);
        assert_eq!(s.weights[3], 0.0);
    }

    #[test]
    fn test_cubic_derivative_matches_finite_difference() {
        let h = 1e-6;
        for &u in &[0.2, 0.5, 0.8] {
            let d = CubicBSpline::basis_derivative(u);
            let plus = CubicBSpline::basis(u + h);
            let minus = CubicBSpline::basis(u - h);
            for m in 0..4 {
                let fd = (plus[m] - minus[m]) / (2.0 * h);
                assert!((fd - d[m]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_cubic_reproduces_linear_functions() {
        // sum_j j * B(u - j) = u for uniform cubic B-splines.
        let u = 3.3;
        let s = CubicBSpline::sample(u);
        let value: f64 = (0..4).map(|m| (s.first + m as i64) as f64 * s.weights[m]).sum();
        assert!((value - u).abs() < 1e-13);
    }

    #[test]
    fn test_linear_kernel() {
        let s = LinearKernel::sample(1.25);
        assert_eq!(s.first, 1);
        assert_eq!(s.len, 2);
        assert!((s.weights[0] - 0.75).abs() < 1e-15);
        assert!((s.weights[1] - 0.25).abs() < 1e-15);
    }
}
