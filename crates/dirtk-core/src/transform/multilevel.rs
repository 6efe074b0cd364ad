//! Multi-level stationary velocity FFD composed in log space.
//!
//! The mapping is the exponential of one summed velocity field
//! `u(x) = L x + l + Σ_i v_i(x)`, where `[L l; 0 0] = log(A)` is the
//! logarithm of the global affine matrix and `v_i` are the level velocities.
//! The global logarithm is cached against a counter owned by the compositor
//! that moves on every change to the global parameters, including
//! replacement. Levels are integrated with the compositor's configuration,
//! which they adopt when added.
//!
//! DOF layout: the 12 global DOFs first, then every level's lattice DOFs in
//! level order.

use std::sync::Arc;

use tracing::debug;

use super::affine::AffineTransform;
use super::flow::{flow_displacement, flow_inverse, flow_transform, FlowGradient};
use super::global::AFFINE_DOFS;
use super::logm::logm;
use super::svffd::Svffd;
use super::trait_::{PointGradient, SpatialTransform};
use crate::cache::{DisplacementCache, VersionedCache};
use crate::error::{Result, TransformError};
use crate::image::{DisplacementField, ImageDomain};
use crate::integration::{IntegrationConfig, Inversion, VelocityField};
use crate::interpolation::{CubicBSpline, VelocityEvaluator};
use crate::lattice::DofStatus;
use crate::spatial::{apply_homogeneous, split_homogeneous, Aabb, Matrix3, Matrix4, Point3, Vector3};

#[derive(Debug, Clone)]
pub struct MultiLevelSvffd {
    global: AffineTransform,
    levels: Vec<Svffd>,
    active: Vec<bool>,
    config: IntegrationConfig,
    global_log: VersionedCache<Matrix4>,
    /// Bumped on every write to, or replacement of, the global parameters.
    global_generation: u64,
    cache: DisplacementCache,
    /// Bumped when levels are added, removed or replaced.
    structure: u64,
}

enum DofLocation {
    Global(usize),
    Level(usize, usize),
}

impl Default for MultiLevelSvffd {
    fn default() -> Self {
        Self::new(AffineTransform::default())
    }
}

impl MultiLevelSvffd {
    /// Multi-level transformation around `global`, with no levels.
    ///
    /// The global DOFs are made passive: their parametric gradient through
    /// the matrix logarithm is not available.
    pub fn new(mut global: AffineTransform) -> Self {
        global.set_all_status(DofStatus::Passive);
        Self {
            global,
            levels: Vec::new(),
            active: Vec::new(),
            config: IntegrationConfig::default(),
            global_log: VersionedCache::new(),
            global_generation: 0,
            cache: DisplacementCache::new(),
            structure: 0,
        }
    }

    /// Integration settings for the summed field; every level adopts them.
    pub fn with_config(mut self, config: IntegrationConfig) -> Result<Self> {
        config.validate()?;
        for level in &mut self.levels {
            level.adopt_config(&config);
        }
        self.config = config;
        self.cache.clear();
        Ok(self)
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn global(&self) -> &AffineTransform {
        &self.global
    }

    /// Replace the global transformation, keeping its DOF status.
    pub fn set_global(&mut self, global: AffineTransform) {
        let before = self.version();
        self.global = global;
        self.global_generation += 1;
        self.touch(before);
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[Svffd] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&Svffd> {
        self.levels.get(index)
    }

    /// Append a level; new levels are active and take over the
    /// compositor's integration settings.
    pub fn push_level(&mut self, mut level: Svffd) {
        let before = self.version();
        level.adopt_config(&self.config);
        self.levels.push(level);
        self.active.push(true);
        self.touch(before);
    }

    pub fn remove_level(&mut self, index: usize) -> Result<Svffd> {
        self.check_level(index)?;
        let before = self.version();
        self.active.remove(index);
        let level = self.levels.remove(index);
        self.touch(before);
        Ok(level)
    }

    pub fn is_level_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Inactive levels still deform, but their DOFs report as passive.
    pub fn set_level_active(&mut self, index: usize, active: bool) -> Result<()> {
        self.check_level(index)?;
        self.active[index] = active;
        Ok(())
    }

    /// Logarithm of the global matrix, recomputed only when the global
    /// parameters have changed since the last call.
    pub fn global_log(&self) -> Result<Matrix4> {
        self.global_log.get_or_try_insert_with(self.global_generation, || {
            debug!(generation = self.global_generation, "recomputing global matrix logarithm");
            logm(&self.global.matrix())
        })
    }

    /// Summed velocity `u(x)` at `p`.
    pub fn velocity(&self, p: &Point3) -> Result<Vector3> {
        Ok(self.field()?.velocity(p, 0.0))
    }

    /// Sum all levels into the first one, leaving a single level.
    ///
    /// Log-space composition adds velocities, so summing the coefficients of
    /// lattices with identical geometry reproduces the mapping exactly.
    pub fn combine_local_transformations(&mut self) -> Result<()> {
        if self.levels.len() < 2 {
            return Ok(());
        }
        let before = self.version();
        let (first, rest) = self.levels.split_at_mut(1);
        let target = first[0].lattice_mut();
        for (i, level) in rest.iter().enumerate() {
            if !target.same_geometry(level.lattice()) {
                return Err(TransformError::configuration(format!(
                    "level {} lattice geometry differs from level 0; cannot combine",
                    i + 1
                )));
            }
        }
        let mut values = target.values().to_vec();
        for level in rest.iter() {
            for (v, w) in values.iter_mut().zip(level.lattice().values()) {
                *v += w;
            }
        }
        target.put_all(&values)?;
        self.levels.truncate(1);
        self.active.truncate(1);
        self.touch(before);
        debug!("combined local levels into level 0");
        Ok(())
    }

    /// Absorb the global transformation into the first level.
    ///
    /// The global velocity `L x + l` is linear, which cubic B-splines
    /// reproduce exactly with coefficients `L c_k + l` at the nodes `c_k`;
    /// the mapping is preserved wherever the level lattice has full support.
    /// The global transformation is reset to the identity.
    pub fn merge_global_into_local_displacement(&mut self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(TransformError::configuration(
                "merging the global transformation needs at least one level",
            ));
        }
        let (linear, offset) = split_homogeneous(&self.global_log()?);
        let before = self.version();
        let lattice = self.levels[0].lattice_mut();
        for node in 0..lattice.num_nodes() {
            let x = lattice.node_world(node);
            let value = lattice.node_value(node) + linear * x.coords + offset;
            lattice.set_node_value(node, &value)?;
        }
        self.global.reset();
        self.global_generation += 1;
        self.touch(before);
        Ok(())
    }

    /// Keep the version strictly increasing across a structural change
    /// that started at version `before`.
    fn touch(&mut self, before: u64) {
        let now = self.version();
        if now <= before {
            self.structure += before - now + 1;
        }
        self.cache.clear();
    }

    fn check_level(&self, index: usize) -> Result<()> {
        if index < self.levels.len() {
            Ok(())
        } else {
            Err(TransformError::configuration(format!(
                "level {index} out of range for {} levels",
                self.levels.len()
            )))
        }
    }

    fn locate(&self, dof: usize) -> Result<DofLocation> {
        if dof < AFFINE_DOFS {
            return Ok(DofLocation::Global(dof));
        }
        let mut offset = AFFINE_DOFS;
        for (i, level) in self.levels.iter().enumerate() {
            let n = level.num_dofs();
            if dof < offset + n {
                return Ok(DofLocation::Level(i, dof - offset));
            }
            offset += n;
        }
        Err(TransformError::DofIndexOutOfRange {
            index: dof,
            len: self.num_dofs(),
        })
    }

    fn field(&self) -> Result<LogSpaceField<'_>> {
        let (linear, offset) = split_homogeneous(&self.global_log()?);
        let mut levels = Vec::with_capacity(self.levels.len());
        let mut first_dof = AFFINE_DOFS;
        let mut support: Option<Aabb> = None;
        for level in &self.levels {
            levels.push((level.evaluator(), first_dof));
            first_dof += level.num_dofs();
            let b = level.lattice().bounding_box();
            support = Some(support.map_or(b, |s| s.union(&b)));
        }
        let cell = self
            .levels
            .iter()
            .map(|l| l.lattice().cell_size())
            .reduce(f64::min);
        Ok(LogSpaceField {
            linear,
            offset,
            global: self.global.matrix(),
            center: *self.global.center(),
            levels,
            support,
            cell,
            num_dofs: first_dof,
        })
    }
}

/// Summed generator of the global and level transformations.
struct LogSpaceField<'a> {
    linear: Matrix3,
    offset: Vector3,
    global: Matrix4,
    center: Point3,
    levels: Vec<(VelocityEvaluator<'a, CubicBSpline>, usize)>,
    /// Union of the level lattice boxes.
    support: Option<Aabb>,
    cell: Option<f64>,
    num_dofs: usize,
}

impl VelocityField for LogSpaceField<'_> {
    fn velocity(&self, p: &Point3, t: f64) -> Vector3 {
        let mut v = self.linear * p.coords + self.offset;
        for (level, _) in &self.levels {
            v += level.evaluate(p, t);
        }
        v
    }

    fn velocity_jacobian(&self, p: &Point3, t: f64) -> Matrix3 {
        let mut j = self.linear;
        for (level, _) in &self.levels {
            j += level.evaluate_jacobian(p, t);
        }
        j
    }

    fn velocity_and_jacobian(&self, p: &Point3, t: f64) -> (Vector3, Matrix3) {
        let mut v = self.linear * p.coords + self.offset;
        let mut j = self.linear;
        for (level, _) in &self.levels {
            let (lv, lj) = level.evaluate_with_jacobian(p, t);
            v += lv;
            j += lj;
        }
        (v, j)
    }

    /// The linear part is bounded on the ball about the global centre that
    /// holds the region, the level support and their global image, using
    /// `|L x + l| <= |L|_F |x - c| + |L c + l|`. Rotations about the centre
    /// keep trajectories on spheres inside that ball.
    fn speed_bound(&self, region: &Aabb) -> f64 {
        let mut hull = match &self.support {
            Some(s) => region.union(s),
            None => *region,
        };
        for corner in hull.corners() {
            hull.include(&apply_homogeneous(&self.global, &corner));
        }
        let radius = hull
            .corners()
            .iter()
            .map(|c| (c - self.center).norm())
            .fold(0.0, f64::max);
        let drift = (self.linear * self.center.coords + self.offset).norm();
        let linear = self.linear.norm() * radius + drift;
        self.levels
            .iter()
            .fold(linear, |acc, (level, _)| acc + level.speed_bound(region))
    }

    fn cell_size(&self) -> Option<f64> {
        self.cell
    }

    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn accumulate_dof_gradient(&self, p: &Point3, t: f64, adjoint: &Vector3, grad: &mut [f64]) {
        for (level, first) in &self.levels {
            let n = level.num_dofs();
            level.accumulate_dof_gradient(p, t, adjoint, &mut grad[*first..*first + n]);
        }
    }
}

impl SpatialTransform for MultiLevelSvffd {
    fn num_dofs(&self) -> usize {
        AFFINE_DOFS + self.levels.iter().map(Svffd::num_dofs).sum::<usize>()
    }

    fn get(&self, dof: usize) -> Result<f64> {
        match self.locate(dof)? {
            DofLocation::Global(d) => self.global.get(d),
            DofLocation::Level(i, d) => self.levels[i].get(d),
        }
    }

    fn put(&mut self, dof: usize, value: f64) -> Result<()> {
        match self.locate(dof)? {
            DofLocation::Global(d) => {
                self.global.put(d, value)?;
                self.global_generation += 1;
            }
            DofLocation::Level(i, d) => self.levels[i].put(d, value)?,
        }
        self.cache.clear();
        Ok(())
    }

    fn status(&self, dof: usize) -> Result<DofStatus> {
        match self.locate(dof)? {
            DofLocation::Global(d) => self.global.status(d),
            DofLocation::Level(i, _) if !self.active[i] => Ok(DofStatus::Passive),
            DofLocation::Level(i, d) => self.levels[i].status(d),
        }
    }

    fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()> {
        match self.locate(dof)? {
            DofLocation::Global(d) => self.global.set_status(d, status),
            DofLocation::Level(i, d) => self.levels[i].set_status(d, status),
        }
    }

    /// Components only ever count up, so their sum identifies the mapping.
    fn version(&self) -> u64 {
        self.structure + self.global.version() + self.levels.iter().map(Svffd::version).sum::<u64>()
    }

    fn transform(&self, p: &Point3, t0: f64, t1: f64) -> Result<Point3> {
        flow_transform(&self.field()?, &self.config, p, t0, t1)
    }

    fn inverse(&self, p: &Point3, t0: f64, t1: f64) -> Result<Inversion> {
        flow_inverse(&self.field()?, &self.config, p, t0, t1)
    }

    fn displacement(&self, domain: &ImageDomain, t0: f64, t1: f64) -> Result<Arc<DisplacementField>> {
        self.cache.get_or_try_insert_with(domain, t0, t1, self.version(), || {
            flow_displacement(&self.field()?, &self.config, domain, t0, t1)
        })
    }

    fn point_gradient(&self, domain: Option<&ImageDomain>, t0: f64, t1: f64) -> Result<Box<dyn PointGradient + '_>> {
        Ok(Box::new(FlowGradient::new(self.field()?, &self.config, domain, t0, t1)?))
    }

    /// Only level DOFs; the global ones sit behind the matrix logarithm.
    fn is_differentiable(&self, dof: usize) -> bool {
        dof >= AFFINE_DOFS
    }

    fn check_gradient_support(&self) -> Result<()> {
        let active = (0..AFFINE_DOFS)
            .filter_map(|d| self.global.status(d).ok())
            .any(|s| s.is_active());
        if active {
            return Err(TransformError::not_implemented(
                "parametric gradient of the global DOFs of a multi-level SVFFD",
            ));
        }
        Ok(())
    }
}
