//! Continuous evaluation of lattice vectors at world points.

use std::marker::PhantomData;

use super::kernel::{KernelSample, SeparableKernel};
use crate::integration::VelocityField;
use crate::lattice::ControlLattice;
use crate::spatial::{Aabb, Matrix3, Point3, Vector3};

/// Interpolates a lattice at arbitrary world points and times.
///
/// Control nodes outside the spatial lattice are treated as zero, so the
/// interpolated field has compact support. Along the temporal axis the
/// boundary nodes are replicated.
#[derive(Debug)]
pub struct VelocityEvaluator<'a, K: SeparableKernel> {
    lattice: &'a ControlLattice,
    kernel: PhantomData<K>,
}

impl<K: SeparableKernel> Clone for VelocityEvaluator<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: SeparableKernel> Copy for VelocityEvaluator<'_, K> {}

impl<'a, K: SeparableKernel> VelocityEvaluator<'a, K> {
    pub fn new(lattice: &'a ControlLattice) -> Self {
        Self {
            lattice,
            kernel: PhantomData,
        }
    }

    pub fn lattice(&self) -> &'a ControlLattice {
        self.lattice
    }

    /// Visit every node influencing `(p, t)` with its weight and the weight
    /// gradient in lattice index units.
    pub fn for_each_weight<F>(&self, p: &Point3, t: f64, mut f: F)
    where
        F: FnMut(usize, f64, Vector3),
    {
        let [nx, ny, nz, nt] = self.lattice.size();
        let u = self.lattice.world_to_lattice(p);
        let sx = K::sample(u.x);
        let sy = K::sample(u.y);
        let sz = K::sample(u.z);
        let st = if nt > 1 {
            K::sample(self.lattice.time_to_lattice(t))
        } else {
            KernelSample {
                first: 0,
                len: 1,
                weights: [1.0, 0.0, 0.0, 0.0],
                derivatives: [0.0; 4],
            }
        };

        for m in 0..st.len {
            let wt = st.weights[m];
            if wt == 0.0 {
                continue;
            }
            let l = (st.first + m as i64).clamp(0, nt as i64 - 1) as usize;
            for c in 0..sz.len {
                let k = sz.first + c as i64;
                if k < 0 || k >= nz as i64 {
                    continue;
                }
                for b in 0..sy.len {
                    let j = sy.first + b as i64;
                    if j < 0 || j >= ny as i64 {
                        continue;
                    }
                    for a in 0..sx.len {
                        let i = sx.first + a as i64;
                        if i < 0 || i >= nx as i64 {
                            continue;
                        }
                        let wx = sx.weights[a];
                        let wy = sy.weights[b];
                        let wz = sz.weights[c];
                        let grad = Vector3::new(
                            sx.derivatives[a] * wy * wz,
                            wx * sy.derivatives[b] * wz,
                            wx * wy * sz.derivatives[c],
                        ) * wt;
                        let node = self.lattice.node_index(i as usize, j as usize, k as usize, l);
                        f(node, wx * wy * wz * wt, grad);
                    }
                }
            }
        }
    }

    /// Interpolated vector at `(p, t)`.
    pub fn evaluate(&self, p: &Point3, t: f64) -> Vector3 {
        let mut v = Vector3::zeros();
        self.for_each_weight(p, t, |node, w, _| {
            v += self.lattice.node_value(node) * w;
        });
        v
    }

    /// Spatial Jacobian of the interpolated vector in world units.
    pub fn evaluate_jacobian(&self, p: &Point3, t: f64) -> Matrix3 {
        self.evaluate_with_jacobian(p, t).1
    }

    pub fn evaluate_with_jacobian(&self, p: &Point3, t: f64) -> (Vector3, Matrix3) {
        let mut v = Vector3::zeros();
        let mut j_index = Matrix3::zeros();
        self.for_each_weight(p, t, |node, w, grad| {
            let c = self.lattice.node_value(node);
            v += c * w;
            j_index += c * grad.transpose();
        });
        (v, j_index * self.lattice.geometry().world_to_index_matrix())
    }
}

impl<K: SeparableKernel> VelocityField for VelocityEvaluator<'_, K> {
    fn velocity(&self, p: &Point3, t: f64) -> Vector3 {
        self.evaluate(p, t)
    }

    fn velocity_jacobian(&self, p: &Point3, t: f64) -> Matrix3 {
        self.evaluate_jacobian(p, t)
    }

    fn velocity_and_jacobian(&self, p: &Point3, t: f64) -> (Vector3, Matrix3) {
        self.evaluate_with_jacobian(p, t)
    }

    fn speed_bound(&self, _region: &Aabb) -> f64 {
        self.lattice.max_control_norm()
    }

    fn cell_size(&self) -> Option<f64> {
        Some(self.lattice.cell_size())
    }

    fn is_stationary(&self) -> bool {
        !self.lattice.is_temporal()
    }

    fn num_dofs(&self) -> usize {
        self.lattice.num_dofs()
    }

    fn accumulate_dof_gradient(&self, p: &Point3, t: f64, adjoint: &Vector3, grad: &mut [f64]) {
        let n = self.lattice.num_nodes();
        self.for_each_weight(p, t, |node, w, _| {
            for c in 0..3 {
                grad[c * n + node] += w * adjoint[c];
            }
        });
    }
}
