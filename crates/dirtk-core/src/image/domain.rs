//! Image domain: the sampling grid of an image in physical space.
//!
//! A domain carries no voxel data. It describes how discrete voxel indices
//! map to world coordinates:
//! `point = origin + Direction * (index * spacing)`

use crate::error::{Result, TransformError};
use crate::spatial::{Aabb, Direction3, Matrix3, Point3, Spacing3};

/// Regular 3D sampling grid with physical metadata.
///
/// Voxels are enumerated with x fastest, then y, then z, matching the
/// `[nz, ny, nx]` layout of image tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDomain {
    /// Number of voxels along x, y and z.
    size: [usize; 3],
    /// Physical coordinate of voxel (0, 0, 0).
    origin: Point3,
    /// Physical distance between voxels along each axis.
    spacing: Spacing3,
    /// Orientation of the image axes (columns are axis directions).
    direction: Direction3,
    /// Cached `Spacing^-1 * Direction^-1`.
    world_to_index: Matrix3,
}

impl ImageDomain {
    /// Create a new domain.
    ///
    /// Fails with a configuration error when a dimension is zero, a spacing
    /// is not strictly positive, or the direction matrix is singular.
    pub fn new(
        size: [usize; 3],
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
    ) -> Result<Self> {
        if size.iter().any(|&n| n == 0) {
            return Err(TransformError::configuration(format!(
                "image domain has an empty dimension: {size:?}"
            )));
        }
        if spacing.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(TransformError::configuration(format!(
                "image spacing must be positive and finite, got {:?}",
                spacing.as_slice()
            )));
        }
        let inv_dir = direction.try_inverse().ok_or_else(|| {
            TransformError::configuration("image direction matrix is singular")
        })?;
        let inv_spacing = Matrix3::from_diagonal(&spacing.map(|s| 1.0 / s));
        Ok(Self {
            size,
            origin,
            spacing,
            direction,
            world_to_index: inv_spacing * inv_dir,
        })
    }

    /// Axis-aligned domain with identity orientation.
    pub fn axis_aligned(size: [usize; 3], origin: Point3, spacing: Spacing3) -> Result<Self> {
        Self::new(size, origin, spacing, Direction3::identity())
    }

    /// Get the number of voxels along each axis.
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Get the origin.
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Get the spacing.
    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    /// Get the direction.
    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Smallest voxel spacing, the cell size used for substep bounds.
    pub fn min_spacing(&self) -> f64 {
        self.spacing.min()
    }

    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Shape of a vector tensor over this domain: `[3, nz, ny, nx]`.
    pub fn tensor_shape(&self) -> [usize; 4] {
        [3, self.size[2], self.size[1], self.size[0]]
    }

    /// Linear voxel index of `(i, j, k)`.
    pub fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.size[1] + j) * self.size[0] + i
    }

    /// Discrete index of a linear voxel index.
    pub fn voxel_index(&self, linear: usize) -> [usize; 3] {
        let i = linear % self.size[0];
        let j = (linear / self.size[0]) % self.size[1];
        let k = linear / (self.size[0] * self.size[1]);
        [i, j, k]
    }

    /// Linear map from world offsets to continuous index offsets.
    pub fn world_to_index_matrix(&self) -> &Matrix3 {
        &self.world_to_index
    }

    /// Convert a continuous index to a physical point.
    pub fn index_to_world(&self, index: &Point3) -> Point3 {
        let scaled = index.coords.component_mul(&self.spacing);
        self.origin + self.direction * scaled
    }

    /// Convert a physical point to a continuous index.
    pub fn world_to_index(&self, point: &Point3) -> Point3 {
        Point3::from(self.world_to_index * (point - self.origin))
    }

    /// World coordinate of a voxel given its linear index.
    pub fn voxel_to_world(&self, linear: usize) -> Point3 {
        let [i, j, k] = self.voxel_index(linear);
        self.index_to_world(&Point3::new(i as f64, j as f64, k as f64))
    }

    /// World-space bounding box of the voxel centres.
    pub fn bounding_box(&self) -> Aabb {
        let last = Point3::new(
            (self.size[0] - 1) as f64,
            (self.size[1] - 1) as f64,
            (self.size[2] - 1) as f64,
        );
        let index_box = Aabb {
            min: Point3::origin(),
            max: last,
        };
        let corners = index_box.corners().map(|c| self.index_to_world(&c));
        let mut aabb = Aabb::from_point(&corners[0]);
        for c in &corners[1..] {
            aabb.include(c);
        }
        aabb
    }
}
