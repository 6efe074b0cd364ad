//! Spatial types for representing points, vectors and orientation matrices.
//!
//! All types are nalgebra aliases in double precision; world coordinates are
//! in millimetres.

use nalgebra::{Matrix3 as NaMatrix3, Matrix4 as NaMatrix4, Point3 as NaPoint3, Vector3 as NaVector3};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Matrix3 = NaMatrix3<f64>;
pub type Matrix4 = NaMatrix4<f64>;
pub type Spacing3 = NaVector3<f64>;
pub type Direction3 = NaMatrix3<f64>;

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    /// Degenerate box containing a single point.
    pub fn from_point(p: &Point3) -> Self {
        Self { min: *p, max: *p }
    }

    /// Smallest box containing all points. Returns `None` for an empty slice.
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::from_point(first);
        for p in rest {
            aabb.include(p);
        }
        Some(aabb)
    }

    /// Grow the box to contain `p`.
    pub fn include(&mut self, p: &Point3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Union with another box.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// The eight corners of the box.
    pub fn corners(&self) -> [Point3; 8] {
        std::array::from_fn(|i| {
            Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    pub fn contains(&self, p: &Point3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

/// Homogeneous 4×4 matrix from a linear part and a translation.
pub fn homogeneous(linear: &Matrix3, translation: &Vector3) -> Matrix4 {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Split a homogeneous matrix into its linear part and translation.
pub fn split_homogeneous(m: &Matrix4) -> (Matrix3, Vector3) {
    (
        m.fixed_view::<3, 3>(0, 0).into_owned(),
        m.fixed_view::<3, 1>(0, 3).into_owned(),
    )
}

/// Apply the affine part of a homogeneous matrix to a point.
pub fn apply_homogeneous(m: &Matrix4, p: &Point3) -> Point3 {
    let (linear, translation) = split_homogeneous(m);
    Point3::from(linear * p.coords + translation)
}

pub(crate) fn is_finite_vector(v: &Vector3) -> bool {
    v.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(&[
            Point3::new(1.0, -2.0, 3.0),
            Point3::new(-1.0, 4.0, 0.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 4.0, 3.0));
        assert!(aabb.contains(&Point3::new(0.0, 0.0, 1.0)));
        assert!(!aabb.contains(&Point3::new(0.0, 5.0, 1.0)));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn test_aabb_corners_cover_extremes() {
        let aabb = Aabb {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(1.0, 2.0, 3.0),
        };
        let corners = aabb.corners();
        assert!(corners.contains(&Point3::new(0.0, 0.0, 0.0)));
        assert!(corners.contains(&Point3::new(1.0, 2.0, 3.0)));
        assert!(corners.contains(&Point3::new(1.0, 0.0, 3.0)));
    }

    #[test]
    fn test_homogeneous_roundtrip() {
        let linear = Matrix3::new(1.0, 2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0);
        let t = Vector3::new(1.0, 2.0, 3.0);
        let m = homogeneous(&linear, &t);
        let (l2, t2) = split_homogeneous(&m);
        assert_eq!(l2, linear);
        assert_eq!(t2, t);
        let p = apply_homogeneous(&m, &Point3::new(1.0, 1.0, 1.0));
        assert_eq!(p, Point3::new(4.0, 3.0, 5.0));
    }
}
