//! Error types for registration objectives.

use dirtk_core::TransformError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Error raised by an energy term.
    #[error("Energy error: {0}")]
    EnergyError(String),

    /// Error raised by the transformation engine.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an energy error.
    pub fn energy(msg: impl Into<String>) -> Self {
        Self::EnergyError(msg.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether the failure is an unsupported gradient path.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::Transform(e) if e.is_not_implemented())
    }
}
