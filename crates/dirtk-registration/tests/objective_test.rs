use burn_ndarray::NdArray;
use dirtk_core::{
    ControlLattice, DofStatus, ImageDomain, MultiLevelSvffd, Point3, SpatialTransform, Svffd, Transformation, Vector3,
};
use dirtk_registration::{DiffusionEnergy, DisplacementMse, Objective};

type B = NdArray<f32>;

fn domain() -> ImageDomain {
    ImageDomain::axis_aligned([6, 6, 6], Point3::origin(), Vector3::repeat(1.0)).unwrap()
}

fn lattice() -> ControlLattice {
    ControlLattice::covering(&domain(), 2.5).unwrap()
}

fn ground_truth() -> Svffd {
    let mut lattice = lattice();
    let n = lattice.num_dofs();
    let values: Vec<f64> = (0..n).map(|i| 0.4 * ((i as f64) * 0.37).sin()).collect();
    lattice.put_all(&values).unwrap();
    Svffd::new(lattice).unwrap()
}

fn mse_objective() -> Objective {
    let target = ground_truth().displacement(&domain(), 0.0, 1.0).unwrap();
    Objective::new(domain())
        .with_term(DisplacementMse::new(target.as_ref().clone()).unwrap())
        .unwrap()
}

#[test]
fn test_objective_gradient_matches_finite_difference() {
    let objective = mse_objective();
    let svffd = Svffd::new(lattice()).unwrap();
    let mut transform: Transformation = svffd.into();
    for dof in 0..transform.num_dofs() {
        transform.put(dof, 0.05 * ((dof as f64) * 1.3).cos()).unwrap();
    }
    let evaluation = objective.evaluate(&transform).unwrap();
    let eps = 1e-6;
    for dof in (0..transform.num_dofs()).step_by(11) {
        let value = transform.get(dof).unwrap();
        let mut plus = transform.clone();
        plus.put(dof, value + eps).unwrap();
        let mut minus = transform.clone();
        minus.put(dof, value - eps).unwrap();
        let fd = (objective.value(&plus).unwrap() - objective.value(&minus).unwrap()) / (2.0 * eps);
        let analytic = evaluation.gradient[dof];
        assert!(
            (fd - analytic).abs() <= 1e-4 * fd.abs().max(analytic.abs()).max(1e-2),
            "dof {dof}: {analytic} vs {fd}"
        );
    }
}

#[test]
fn test_descent_reduces_objective() {
    let objective = mse_objective()
        .with_term(DiffusionEnergy::<B>::new(0.01, Default::default()))
        .unwrap();
    let mut transform = Svffd::new(lattice()).unwrap();
    let initial = objective.evaluate(&transform).unwrap();
    assert!(initial.value > 0.0);
    assert_eq!(initial.terms.len(), 2);

    let mut current = initial.clone();
    let mut step = 1.0;
    for _ in 0..5 {
        let mut accepted = false;
        for _ in 0..20 {
            let mut trial = transform.clone();
            for (dof, g) in current.gradient.iter().enumerate() {
                trial.put(dof, transform.get(dof).unwrap() - step * g).unwrap();
            }
            let evaluation = objective.evaluate(&trial).unwrap();
            if evaluation.value < current.value {
                transform = trial;
                current = evaluation;
                accepted = true;
                break;
            }
            step *= 0.5;
        }
        assert!(accepted, "no descent step found");
    }
    assert!(current.value < initial.value);
}

#[test]
fn test_active_global_gradient_is_reported() {
    let mut mffd = MultiLevelSvffd::default();
    mffd.push_level(ground_truth());
    mffd.set_status(3, DofStatus::Active).unwrap();
    let err = mse_objective().evaluate(&mffd).unwrap_err();
    assert!(err.is_not_implemented());
}

#[test]
fn test_passive_dofs_get_no_gradient() {
    let objective = mse_objective();
    let mut transform = Svffd::new(lattice()).unwrap();
    transform.set_all_status(DofStatus::Passive);
    let evaluation = objective.evaluate(&transform).unwrap();
    assert!(evaluation.value > 0.0);
    assert!(evaluation.gradient.iter().all(|g| *g == 0.0));
}
