//! Validation utilities for objective evaluation.
//!
//! Checks applied at the seams between energy terms and the transformation
//! engine: domain agreement, finite values and sane weights.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};
use dirtk_core::{ImageDomain, VectorImage};

use crate::error::{RegistrationError, Result};

/// Validate that an image lives on the expected domain.
pub fn validate_domain(expected: &ImageDomain, actual: &ImageDomain) -> Result<()> {
    if expected.size() != actual.size() {
        return Err(RegistrationError::ShapeMismatch {
            expected: expected.size().to_vec(),
            actual: actual.size().to_vec(),
        });
    }
    if expected != actual {
        return Err(RegistrationError::invalid_configuration(
            "images share a size but differ in origin, spacing or direction",
        ));
    }
    Ok(())
}

/// Validate that every vector of an image is finite.
pub fn validate_finite(image: &VectorImage, what: &str) -> Result<()> {
    match image.first_non_finite() {
        Some(voxel) => Err(RegistrationError::numerical_instability(format!(
            "{what} is not finite at voxel {:?}",
            image.domain().voxel_index(voxel)
        ))),
        None => Ok(()),
    }
}

/// Validate a term weight.
pub fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "energy weight must be finite and non-negative, got {weight}"
        )));
    }
    Ok(())
}

/// Validate that a tensor holds only finite values.
pub fn validate_tensor<B: Backend, const D: usize>(tensor: &Tensor<B, D>, what: &str) -> Result<()> {
    let total = tensor.clone().abs().sum().into_scalar().elem::<f64>();
    if !total.is_finite() {
        return Err(RegistrationError::numerical_instability(format!("{what} tensor is not finite")));
    }
    Ok(())
}

/// Euclidean norm of a parameter gradient.
pub fn gradient_norm(gradient: &[f64]) -> f64 {
    gradient.iter().map(|g| g * g).sum::<f64>().sqrt()
}

/// Rescale a parameter gradient so its norm does not exceed `max_norm`.
pub fn clip_gradient(gradient: &mut [f64], max_norm: f64) -> f64 {
    let norm = gradient_norm(gradient);
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        gradient.iter_mut().for_each(|g| *g *= scale);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use dirtk_core::{Point3, Vector3};

    type B = NdArray<f32>;

    fn domain(n: usize) -> ImageDomain {
        ImageDomain::axis_aligned([n, n, n], Point3::origin(), Vector3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain(&domain(3), &domain(3)).is_ok());
        assert!(matches!(
            validate_domain(&domain(3), &domain(4)),
            Err(RegistrationError::ShapeMismatch { .. })
        ));
        let shifted = ImageDomain::axis_aligned([3, 3, 3], Point3::new(1.0, 0.0, 0.0), Vector3::repeat(1.0)).unwrap();
        assert!(matches!(
            validate_domain(&domain(3), &shifted),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_finite() {
        let mut image = VectorImage::zeros(domain(2));
        assert!(validate_finite(&image, "displacement").is_ok());
        image.data_mut()[5] = Vector3::new(f64::NAN, 0.0, 0.0);
        let err = validate_finite(&image, "displacement").unwrap_err();
        assert!(err.to_string().contains("[1, 0, 1]"));
    }

    #[test]
    fn test_validate_weight() {
        assert!(validate_weight(0.0).is_ok());
        assert!(validate_weight(2.5).is_ok());
        assert!(validate_weight(-1.0).is_err());
        assert!(validate_weight(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_tensor() {
        let device = Default::default();
        let tensor = Tensor::<B, 1>::from_floats([1.0, -2.0, 3.0], &device);
        assert!(validate_tensor(&tensor, "gradient").is_ok());
        let tensor = Tensor::<B, 1>::from_floats([1.0, f32::INFINITY, 3.0], &device);
        assert!(validate_tensor(&tensor, "gradient").is_err());
    }

    #[test]
    fn test_clip_gradient() {
        let mut gradient = vec![3.0, 4.0];
        let norm = clip_gradient(&mut gradient, 1.0);
        assert_eq!(norm, 5.0);
        assert!((gradient_norm(&gradient) - 1.0).abs() < 1e-12);

        let mut small = vec![0.1, 0.0];
        clip_gradient(&mut small, 1.0);
        assert_eq!(small, vec![0.1, 0.0]);
    }
}
