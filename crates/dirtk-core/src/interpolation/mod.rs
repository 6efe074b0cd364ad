//! Lattice interpolation.
//!
//! Kernels are separable and applied along each lattice axis; the
//! [`VelocityEvaluator`] combines them into continuous vectors and
//! Jacobians at world points.

pub mod kernel;
pub mod evaluator;

pub use kernel::{CubicBSpline, KernelSample, LinearKernel, SeparableKernel};
pub use evaluator::VelocityEvaluator;
