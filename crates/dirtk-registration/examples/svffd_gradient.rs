//! Fit a stationary velocity FFD to a synthetic displacement by gradient descent.
//!
//! Run with `RUST_LOG=debug` to see integration plans and cache activity.

use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use dirtk_core::{ControlLattice, ImageDomain, Point3, SpatialTransform, Svffd, Vector3};
use dirtk_registration::validation::clip_gradient;
use dirtk_registration::{DiffusionEnergy, DisplacementMse, Objective};
use tracing::info;
use tracing_subscriber::EnvFilter;

type B = NdArray<f32>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let domain = ImageDomain::axis_aligned([16, 16, 16], Point3::origin(), Vector3::repeat(1.0))?;
    let lattice = ControlLattice::covering(&domain, 4.0)?;

    // Ground truth: a smooth swirl about the z axis.
    let mut truth = Svffd::new(lattice.clone())?;
    for node in 0..lattice.num_nodes() {
        let p = lattice.node_world(node) - Point3::new(7.5, 7.5, 7.5);
        let falloff = (-p.norm_squared() / 50.0).exp();
        truth.set_node_value(node, &(Vector3::new(-p.y, p.x, 0.0) * (0.15 * falloff)))?;
    }
    let target = truth
        .displacement(&domain, 0.0, 1.0)
        .context("exponentiating ground truth")?;
    info!(max_displacement = target.max_norm(), "target ready");

    let objective = Objective::new(domain.clone())
        .with_term(DisplacementMse::new(target.as_ref().clone())?)?
        .with_term(DiffusionEnergy::<B>::new(0.05, Default::default()))?;

    let mut estimate = Svffd::new(lattice)?;
    let mut evaluation = objective.evaluate(&estimate)?;
    let mut step = 0.5;
    for iteration in 0..40 {
        let mut gradient = evaluation.gradient.clone();
        let norm = clip_gradient(&mut gradient, 10.0);
        let mut trial = estimate.clone();
        for (dof, g) in gradient.iter().enumerate() {
            trial.put(dof, estimate.get(dof)? - step * g)?;
        }
        let next = objective.evaluate(&trial).context("evaluating trial step")?;
        if next.value < evaluation.value {
            estimate = trial;
            evaluation = next;
            step *= 1.2;
        } else {
            step *= 0.5;
        }
        info!(iteration, value = evaluation.value, gradient_norm = norm, step, "descent");
    }

    let recovered = estimate.displacement(&domain, 0.0, 1.0)?;
    let error = recovered
        .data()
        .iter()
        .zip(target.data())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max);
    info!(max_error = error, terms = ?evaluation.terms, "finished");

    let probe = Point3::new(9.0, 7.5, 7.5);
    let mapped = estimate.transform(&probe, 0.0, 1.0)?;
    let back = estimate.inverse(&mapped, 0.0, 1.0)?;
    info!(?mapped, residual = (back.point - probe).norm(), converged = back.converged, "inverse check");
    Ok(())
}
