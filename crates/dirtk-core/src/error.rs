//! Error types for transformation operations.
//!
//! Configuration and divergence errors terminate the current evaluation;
//! local search failures (inverse transforms) are reported as values instead.

use thiserror::Error;

use crate::spatial::Point3;

/// Main error type for lattice, integration and transformation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Inconsistent lattice, image or integration setup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A non-finite value appeared while integrating a velocity field.
    #[error("Numerical divergence at substep {step} (point {point:?})")]
    NumericalDivergence { step: usize, point: [f64; 3] },

    /// The requested operation has no implementation for this variant.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// DOF index outside the parameter vector.
    #[error("DOF index {index} out of range for {len} DOFs")]
    DofIndexOutOfRange { index: usize, len: usize },

    /// Shape mismatch between buffers.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor data could not be converted.
    #[error("Tensor error: {0}")]
    Tensor(String),
}

/// Result type for transformation operations.
pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a not-implemented error.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a divergence error for the given substep and point.
    pub fn divergence(step: usize, point: &Point3) -> Self {
        Self::NumericalDivergence {
            step,
            point: [point.x, point.y, point.z],
        }
    }

    /// Create a tensor conversion error.
    pub fn tensor(msg: impl Into<String>) -> Self {
        Self::Tensor(msg.into())
    }

    /// Whether this error reports a missing gradient path rather than a failure.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

/// Check a DOF index against the parameter count.
pub(crate) fn check_dof(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(TransformError::DofIndexOutOfRange { index, len })
    }
}
