//! Serializable parameter records for every transformation variant.
//!
//! A record holds geometric attributes first, then DOF values in lattice
//! order, then DOF status flags. Multi-level records nest the global record
//! and one record per level.

use anyhow::{Context, Result};
use dirtk_core::spatial::{Direction3, Point3, Vector3};
use dirtk_core::{
    AffineTransform, BSplineFfd, ControlLattice, DofStatus, ImageDomain, IntegrationConfig, LinearFfd,
    MultiLevelSvffd, RigidTransform, SpatialTransform, Svffd, TemporalDiffeomorphicFfd, TransformKind,
    Transformation,
};
use serde::{Deserialize, Serialize};

/// Geometry of an image domain or lattice node grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub size: [usize; 3],
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    /// Direction cosines, row-major.
    pub direction: [[f64; 3]; 3],
}

impl From<&ImageDomain> for DomainRecord {
    fn from(domain: &ImageDomain) -> Self {
        let d = domain.direction();
        Self {
            size: domain.size(),
            origin: [domain.origin().x, domain.origin().y, domain.origin().z],
            spacing: [domain.spacing()[0], domain.spacing()[1], domain.spacing()[2]],
            direction: [0, 1, 2].map(|r| [d[(r, 0)], d[(r, 1)], d[(r, 2)]]),
        }
    }
}

impl DomainRecord {
    pub fn to_domain(&self) -> Result<ImageDomain> {
        let direction = Direction3::from_fn(|r, c| self.direction[r][c]);
        Ok(ImageDomain::new(
            self.size,
            Point3::from(self.origin),
            Vector3::from(self.spacing),
            direction,
        )?)
    }
}

/// Control lattice attributes, DOF values and DOF status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeRecord {
    pub geometry: DomainRecord,
    pub nt: usize,
    pub t_origin: f64,
    pub t_spacing: f64,
    pub values: Vec<f64>,
    pub status: Vec<DofStatus>,
}

impl From<&ControlLattice> for LatticeRecord {
    fn from(lattice: &ControlLattice) -> Self {
        Self {
            geometry: DomainRecord::from(lattice.geometry()),
            nt: lattice.size()[3],
            t_origin: lattice.t_origin(),
            t_spacing: lattice.t_spacing(),
            values: lattice.values().to_vec(),
            status: lattice.status_flags().to_vec(),
        }
    }
}

impl LatticeRecord {
    pub fn to_lattice(&self) -> Result<ControlLattice> {
        let geometry = self.geometry.to_domain().context("invalid lattice geometry")?;
        let mut lattice = ControlLattice::from_values(
            geometry,
            self.nt,
            self.t_origin,
            self.t_spacing,
            3,
            self.values.clone(),
        )
        .context("lattice values do not match the lattice geometry")?;
        lattice
            .put_status(&self.status)
            .context("lattice status does not match the lattice geometry")?;
        Ok(lattice)
    }
}

/// Rigid or affine parameters about a centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRecord {
    pub center: [f64; 3],
    pub dofs: Vec<f64>,
    pub status: Vec<DofStatus>,
}

impl GlobalRecord {
    fn capture(transform: &impl SpatialTransform, center: &Point3) -> Result<Self> {
        let n = transform.num_dofs();
        Ok(Self {
            center: [center.x, center.y, center.z],
            dofs: (0..n).map(|dof| transform.get(dof)).collect::<dirtk_core::Result<_>>()?,
            status: (0..n).map(|dof| transform.status(dof)).collect::<dirtk_core::Result<_>>()?,
        })
    }

    fn restore(&self, transform: &mut impl SpatialTransform) -> Result<()> {
        anyhow::ensure!(
            self.dofs.len() == transform.num_dofs() && self.status.len() == transform.num_dofs(),
            "expected {} global parameters, got {} values and {} flags",
            transform.num_dofs(),
            self.dofs.len(),
            self.status.len()
        );
        for (dof, (value, status)) in self.dofs.iter().zip(&self.status).enumerate() {
            transform.put(dof, *value)?;
            transform.set_status(dof, *status)?;
        }
        Ok(())
    }

    fn center(&self) -> Point3 {
        Point3::from(self.center)
    }

    pub fn to_rigid(&self) -> Result<RigidTransform> {
        let mut rigid = RigidTransform::identity(self.center());
        self.restore(&mut rigid).context("invalid rigid parameters")?;
        Ok(rigid)
    }

    pub fn to_affine(&self) -> Result<AffineTransform> {
        let mut affine = AffineTransform::identity(self.center());
        self.restore(&mut affine).context("invalid affine parameters")?;
        Ok(affine)
    }
}

/// A lattice-based transformation and its integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeTransformRecord {
    pub config: IntegrationConfig,
    pub lattice: LatticeRecord,
}

impl LatticeTransformRecord {
    fn new(config: &IntegrationConfig, lattice: &ControlLattice) -> Self {
        Self {
            config: config.clone(),
            lattice: LatticeRecord::from(lattice),
        }
    }
}

/// One local level of a multi-level transformation. Levels integrate with
/// the settings of the enclosing record, so they carry none of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub active: bool,
    pub lattice: LatticeRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLevelRecord {
    pub config: IntegrationConfig,
    pub global: GlobalRecord,
    pub levels: Vec<LevelRecord>,
}

/// Parameters of any [`Transformation`], tagged by its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformRecord {
    Rigid(GlobalRecord),
    Affine(GlobalRecord),
    LinearFfd(LatticeTransformRecord),
    BSplineFfd(LatticeTransformRecord),
    Svffd(LatticeTransformRecord),
    TemporalDiffeomorphicFfd(LatticeTransformRecord),
    MultiLevelSvffd(MultiLevelRecord),
}

impl TransformRecord {
    pub fn kind(&self) -> TransformKind {
        match self {
            Self::Rigid(_) => TransformKind::Rigid,
            Self::Affine(_) => TransformKind::Affine,
            Self::LinearFfd(_) => TransformKind::LinearFfd,
            Self::BSplineFfd(_) => TransformKind::BSplineFfd,
            Self::Svffd(_) => TransformKind::Svffd,
            Self::TemporalDiffeomorphicFfd(_) => TransformKind::TemporalDiffeomorphicFfd,
            Self::MultiLevelSvffd(_) => TransformKind::MultiLevelSvffd,
        }
    }

    /// Capture the current parameters of `transform`.
    pub fn capture(transform: &Transformation) -> Result<Self> {
        Ok(match transform {
            Transformation::Rigid(t) => Self::Rigid(GlobalRecord::capture(t, t.center())?),
            Transformation::Affine(t) => Self::Affine(GlobalRecord::capture(t, t.center())?),
            Transformation::LinearFfd(t) => Self::LinearFfd(LatticeTransformRecord::new(t.config(), t.lattice())),
            Transformation::BSplineFfd(t) => Self::BSplineFfd(LatticeTransformRecord::new(t.config(), t.lattice())),
            Transformation::Svffd(t) => Self::Svffd(LatticeTransformRecord::new(t.config(), t.lattice())),
            Transformation::Temporal(t) => {
                Self::TemporalDiffeomorphicFfd(LatticeTransformRecord::new(t.config(), t.lattice()))
            }
            Transformation::MultiLevel(t) => {
                let levels = t
                    .levels()
                    .iter()
                    .enumerate()
                    .map(|(i, level)| LevelRecord {
                        active: t.is_level_active(i),
                        lattice: LatticeRecord::from(level.lattice()),
                    })
                    .collect();
                Self::MultiLevelSvffd(MultiLevelRecord {
                    config: t.config().clone(),
                    global: GlobalRecord::capture(t.global(), t.global().center())?,
                    levels,
                })
            }
        })
    }

    /// Rebuild the transformation described by this record.
    pub fn restore(&self) -> Result<Transformation> {
        let kind = self.kind();
        let transform: Transformation = match self {
            Self::Rigid(r) => r.to_rigid()?.into(),
            Self::Affine(r) => r.to_affine()?.into(),
            Self::LinearFfd(r) => LinearFfd::new(r.lattice.to_lattice()?)?
                .with_config(r.config.clone())?
                .into(),
            Self::BSplineFfd(r) => BSplineFfd::new(r.lattice.to_lattice()?)?
                .with_config(r.config.clone())?
                .into(),
            Self::Svffd(r) => Svffd::with_config(r.lattice.to_lattice()?, r.config.clone())?.into(),
            Self::TemporalDiffeomorphicFfd(r) => {
                TemporalDiffeomorphicFfd::with_config(r.lattice.to_lattice()?, r.config.clone())?.into()
            }
            Self::MultiLevelSvffd(r) => r.restore()?.into(),
        };
        tracing::debug!(%kind, "restored transformation parameters");
        Ok(transform)
    }
}

impl MultiLevelRecord {
    fn restore(&self) -> Result<MultiLevelSvffd> {
        let mut mffd = MultiLevelSvffd::new(self.global.to_affine()?).with_config(self.config.clone())?;
        for (index, level) in self.levels.iter().enumerate() {
            let svffd = Svffd::new(level.lattice.to_lattice()?).with_context(|| format!("invalid level {index}"))?;
            mffd.push_level(svffd);
            mffd.set_level_active(index, level.active)?;
        }
        // The constructor makes global DOFs passive; restore the recorded flags.
        for (dof, status) in self.global.status.iter().enumerate() {
            mffd.set_status(dof, *status)?;
        }
        Ok(mffd)
    }
}

impl TryFrom<&Transformation> for TransformRecord {
    type Error = anyhow::Error;

    fn try_from(transform: &Transformation) -> Result<Self> {
        Self::capture(transform)
    }
}

impl TryFrom<&TransformRecord> for Transformation {
    type Error = anyhow::Error;

    fn try_from(record: &TransformRecord) -> Result<Self> {
        record.restore()
    }
}
