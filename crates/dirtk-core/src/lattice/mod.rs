//! Control lattices holding vector-valued degrees of freedom.
//!
//! A lattice is a regular grid of control nodes with spatial geometry
//! (origin, spacing, orientation) and an optional temporal axis. Every node
//! carries a 3-vector. DOFs are laid out component-major:
//! `dof = component * num_nodes + node`, with node index
//! `((l * nz + k) * ny + j) * nx + i` (x fastest, time slowest).

pub mod status;

pub use status::DofStatus;

use tracing::debug;

use crate::error::{check_dof, Result, TransformError};
use crate::image::ImageDomain;
use crate::spatial::{Aabb, Point3, Vector3};

/// Number of vector components per control node.
pub const COMPONENTS: usize = 3;

/// Regular grid of vector DOFs with geometric attributes and DOF status.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlLattice {
    /// Spatial node grid; `size` counts nodes per axis.
    geometry: ImageDomain,
    /// Number of temporal nodes; 1 for stationary lattices.
    nt: usize,
    /// Time of the first temporal node.
    t_origin: f64,
    /// Time between temporal nodes.
    t_spacing: f64,
    values: Vec<f64>,
    status: Vec<DofStatus>,
    /// Bumped on every value mutation.
    version: u64,
}

impl ControlLattice {
    /// Stationary lattice with all DOFs zero and active.
    pub fn new(geometry: ImageDomain) -> Self {
        let n = geometry.num_voxels() * COMPONENTS;
        Self {
            geometry,
            nt: 1,
            t_origin: 0.0,
            t_spacing: 1.0,
            values: vec![0.0; n],
            status: vec![DofStatus::Active; n],
            version: 0,
        }
    }

    /// Lattice with `nt` temporal nodes starting at `t_origin`.
    pub fn temporal(geometry: ImageDomain, nt: usize, t_origin: f64, t_spacing: f64) -> Result<Self> {
        if nt == 0 {
            return Err(TransformError::configuration("temporal lattice needs at least one node"));
        }
        if !(t_spacing > 0.0) || !t_spacing.is_finite() {
            return Err(TransformError::configuration(format!(
                "temporal spacing must be positive, got {t_spacing}"
            )));
        }
        let n = geometry.num_voxels() * nt * COMPONENTS;
        Ok(Self {
            geometry,
            nt,
            t_origin,
            t_spacing,
            values: vec![0.0; n],
            status: vec![DofStatus::Active; n],
            version: 0,
        })
    }

    /// Lattice from explicit DOF values in component-major order.
    ///
    /// Fails when the field is not 3-component or when the number of values
    /// does not match the lattice geometry.
    pub fn from_values(
        geometry: ImageDomain,
        nt: usize,
        t_origin: f64,
        t_spacing: f64,
        components: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        if components != COMPONENTS {
            return Err(TransformError::configuration(format!(
                "velocity lattices require a 3-component vector field, got {components} components"
            )));
        }
        let mut lattice = Self::temporal(geometry, nt, t_origin, t_spacing)?;
        if values.len() != lattice.values.len() {
            return Err(TransformError::configuration(format!(
                "lattice of {:?} x {} nodes needs {} values, got {}",
                lattice.geometry.size(),
                nt,
                lattice.values.len(),
                values.len()
            )));
        }
        lattice.values = values;
        Ok(lattice)
    }

    /// Stationary lattice covering an image domain with the given control spacing.
    ///
    /// The lattice shares the domain orientation and is centred on it.
    pub fn covering(domain: &ImageDomain, control_spacing: f64) -> Result<Self> {
        if !(control_spacing > 0.0) || !control_spacing.is_finite() {
            return Err(TransformError::configuration(format!(
                "control point spacing must be positive, got {control_spacing}"
            )));
        }
        let size = domain.size();
        let mut nodes = [1usize; 3];
        let mut half_extent = Vector3::zeros();
        for a in 0..3 {
            let extent = (size[a] - 1) as f64 * domain.spacing()[a];
            let cells = (extent / control_spacing - 1e-9).ceil().max(0.0) as usize;
            nodes[a] = cells + 1;
            half_extent[a] = cells as f64 * control_spacing / 2.0;
        }
        let centre_index = Point3::new(
            (size[0] - 1) as f64 / 2.0,
            (size[1] - 1) as f64 / 2.0,
            (size[2] - 1) as f64 / 2.0,
        );
        let centre = domain.index_to_world(&centre_index);
        let origin = centre - domain.direction() * half_extent;
        let geometry = ImageDomain::new(
            nodes,
            origin,
            Vector3::repeat(control_spacing),
            *domain.direction(),
        )?;
        debug!(?nodes, control_spacing, "created lattice covering image domain");
        Ok(Self::new(geometry))
    }

    /// Spatial geometry of the node grid.
    pub fn geometry(&self) -> &ImageDomain {
        &self.geometry
    }

    /// Nodes along x, y, z and t.
    pub fn size(&self) -> [usize; 4] {
        let [nx, ny, nz] = self.geometry.size();
        [nx, ny, nz, self.nt]
    }

    pub fn is_temporal(&self) -> bool {
        self.nt > 1
    }

    pub fn t_origin(&self) -> f64 {
        self.t_origin
    }

    pub fn t_spacing(&self) -> f64 {
        self.t_spacing
    }

    pub fn num_nodes(&self) -> usize {
        self.geometry.num_voxels() * self.nt
    }

    pub fn num_dofs(&self) -> usize {
        self.values.len()
    }

    /// Version counter, bumped by every value mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Smallest spatial control point spacing.
    pub fn cell_size(&self) -> f64 {
        self.geometry.min_spacing()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn status_flags(&self) -> &[DofStatus] {
        &self.status
    }

    /// Node index of spatial node `(i, j, k)` at temporal node `l`.
    pub fn node_index(&self, i: usize, j: usize, k: usize, l: usize) -> usize {
        let [nx, ny, nz] = self.geometry.size();
        ((l * nz + k) * ny + j) * nx + i
    }

    /// DOF index of one component of a node.
    pub fn dof_index(&self, node: usize, component: usize) -> usize {
        component * self.num_nodes() + node
    }

    /// Node and component of a DOF index.
    pub fn dof_node(&self, dof: usize) -> (usize, usize) {
        (dof % self.num_nodes(), dof / self.num_nodes())
    }

    pub fn get(&self, dof: usize) -> Result<f64> {
        check_dof(dof, self.values.len())?;
        Ok(self.values[dof])
    }

    pub fn put(&mut self, dof: usize, value: f64) -> Result<()> {
        check_dof(dof, self.values.len())?;
        self.values[dof] = value;
        self.version += 1;
        Ok(())
    }

    pub fn add(&mut self, dof: usize, delta: f64) -> Result<()> {
        check_dof(dof, self.values.len())?;
        self.values[dof] += delta;
        self.version += 1;
        Ok(())
    }

    /// Replace all DOF values.
    pub fn put_all(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(TransformError::ShapeMismatch {
                expected: vec![self.values.len()],
                actual: vec![values.len()],
            });
        }
        self.values.copy_from_slice(values);
        self.version += 1;
        Ok(())
    }

    pub fn status(&self, dof: usize) -> Result<DofStatus> {
        check_dof(dof, self.status.len())?;
        Ok(self.status[dof])
    }

    /// Change the status of a DOF. The mapping is unaffected, so the
    /// version is left alone.
    pub fn set_status(&mut self, dof: usize, status: DofStatus) -> Result<()> {
        check_dof(dof, self.status.len())?;
        self.status[dof] = status;
        Ok(())
    }

    pub fn set_all_status(&mut self, status: DofStatus) {
        self.status.fill(status);
    }

    /// Replace all status flags.
    pub fn put_status(&mut self, status: &[DofStatus]) -> Result<()> {
        if status.len() != self.status.len() {
            return Err(TransformError::ShapeMismatch {
                expected: vec![self.status.len()],
                actual: vec![status.len()],
            });
        }
        self.status.copy_from_slice(status);
        Ok(())
    }

    /// Vector stored at a node.
    pub fn node_value(&self, node: usize) -> Vector3 {
        let n = self.num_nodes();
        Vector3::new(self.values[node], self.values[n + node], self.values[2 * n + node])
    }

    pub fn set_node_value(&mut self, node: usize, value: &Vector3) -> Result<()> {
        let n = self.num_nodes();
        check_dof(node, n)?;
        for c in 0..COMPONENTS {
            self.values[c * n + node] = value[c];
        }
        self.version += 1;
        Ok(())
    }

    /// World coordinate of a spatial node (temporal index ignored).
    pub fn node_world(&self, node: usize) -> Point3 {
        let spatial = node % self.geometry.num_voxels();
        self.geometry.voxel_to_world(spatial)
    }

    /// Time of temporal node `l`.
    pub fn node_time(&self, l: usize) -> f64 {
        self.t_origin + l as f64 * self.t_spacing
    }

    /// Continuous spatial lattice index of a world point.
    pub fn world_to_lattice(&self, p: &Point3) -> Point3 {
        self.geometry.world_to_index(p)
    }

    /// Continuous temporal lattice index of a time.
    pub fn time_to_lattice(&self, t: f64) -> f64 {
        (t - self.t_origin) / self.t_spacing
    }

    /// Largest control vector norm. Interpolation weights are non-negative
    /// and sum to at most one, so this bounds the interpolated speed.
    pub fn max_control_norm(&self) -> f64 {
        (0..self.num_nodes())
            .map(|node| self.node_value(node).norm())
            .fold(0.0, f64::max)
    }

    /// Bounding box of the spatial control nodes.
    pub fn bounding_box(&self) -> Aabb {
        self.geometry.bounding_box()
    }

    /// Same node geometry (spatial and temporal) as `other`.
    pub fn same_geometry(&self, other: &ControlLattice) -> bool {
        self.geometry == other.geometry
            && self.nt == other.nt
            && self.t_origin == other.t_origin
            && self.t_spacing == other.t_spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(n: usize) -> ImageDomain {
        ImageDomain::axis_aligned([n, n, n], Point3::origin(), Vector3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_lattice_lengths() {
        let lattice = ControlLattice::new(geometry(3));
        assert_eq!(lattice.num_nodes(), 27);
        assert_eq!(lattice.num_dofs(), 81);
        assert_eq!(lattice.status_flags().len(), lattice.num_dofs());
        assert_eq!(lattice.size(), [3, 3, 3, 1]);
    }

    #[test]
    fn test_temporal_lattice_lengths() {
        let lattice = ControlLattice::temporal(geometry(2), 4, 0.0, 0.25).unwrap();
        assert!(lattice.is_temporal());
        assert_eq!(lattice.num_dofs(), 2 * 2 * 2 * 4 * 3);
        assert_eq!(lattice.node_time(3), 0.75);
    }

    #[test]
    fn test_from_values_rejects_two_components() {
        let result = ControlLattice::from_values(geometry(2), 1, 0.0, 1.0, 2, vec![0.0; 16]);
        assert!(matches!(result, Err(TransformError::Configuration(_))));
    }

    #[test]
    fn test_from_values_rejects_wrong_length() {
        let result = ControlLattice::from_values(geometry(2), 1, 0.0, 1.0, 3, vec![0.0; 23]);
        assert!(matches!(result, Err(TransformError::Configuration(_))));
    }

    #[test]
    fn test_put_bumps_version() {
        let mut lattice = ControlLattice::new(geometry(2));
        let v0 = lattice.version();
        lattice.put(5, 1.5).unwrap();
        assert_eq!(lattice.get(5).unwrap(), 1.5);
        assert!(lattice.version() > v0);

        let v1 = lattice.version();
        lattice.set_status(5, DofStatus::Passive).unwrap();
        assert_eq!(lattice.version(), v1);
        assert_eq!(lattice.status(5).unwrap(), DofStatus::Passive);
    }

    #[test]
    fn test_put_out_of_range() {
        let mut lattice = ControlLattice::new(geometry(2));
        assert!(matches!(
            lattice.put(24, 1.0),
            Err(TransformError::DofIndexOutOfRange { index: 24, len: 24 })
        ));
    }

    #[test]
    fn test_component_major_layout() {
        let mut lattice = ControlLattice::new(geometry(2));
        let node = lattice.node_index(1, 0, 1, 0);
        lattice.set_node_value(node, &Vector3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(lattice.get(lattice.dof_index(node, 1)).unwrap(), 2.0);
        assert_eq!(lattice.dof_node(lattice.dof_index(node, 2)), (node, 2));
        assert_eq!(lattice.max_control_norm(), Vector3::new(1.0, 2.0, 3.0).norm());
    }

    #[test]
    fn test_covering_lattice_spans_domain() {
        let domain = ImageDomain::axis_aligned([11, 11, 6], Point3::origin(), Vector3::repeat(1.0)).unwrap();
        let lattice = ControlLattice::covering(&domain, 2.5).unwrap();
        assert_eq!(lattice.size(), [5, 5, 3, 1]);
        let lattice_box = lattice.bounding_box();
        let domain_box = domain.bounding_box();
        assert!(lattice_box.contains(&domain_box.min));
        assert!(lattice_box.contains(&domain_box.max));
    }
}
