//! Core transformation engine for deformable image registration.
//!
//! Control lattices parameterize displacement and velocity fields; velocity
//! fields are exponentiated by scaling and squaring into diffeomorphic maps;
//! global and local components are composed in log space; and per-voxel
//! energy gradients are pulled back to lattice DOFs by adjoint replay of the
//! integration.

pub mod error;
pub mod spatial;
pub mod image;
pub mod lattice;
pub mod interpolation;
pub mod integration;
pub mod cache;
pub mod transform;
pub mod gradient;

pub use error::{Result, TransformError};
pub use spatial::{Aabb, Matrix3, Matrix4, Point3, Vector3};
pub use image::{DisplacementField, GradientImage, ImageDomain, VectorImage};
pub use lattice::{ControlLattice, DofStatus};
pub use integration::{DisplacementMethod, IntegrationConfig, IntegrationScheme, Inversion};
pub use transform::{
    AffineTransform, BSplineFfd, LinearFfd, MultiLevelSvffd, RigidTransform, SpatialTransform, Svffd,
    TemporalDiffeomorphicFfd, TransformKind, Transformation,
};
pub use gradient::{AdjointGradientEngine, GradientOptions};
