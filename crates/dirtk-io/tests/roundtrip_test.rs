use std::io::Cursor;

use dirtk_core::integration::{DisplacementMethod, IntegrationConfig, IntegrationScheme};
use dirtk_core::{
    AffineTransform, BSplineFfd, ControlLattice, DofStatus, ImageDomain, LinearFfd, MultiLevelSvffd, Point3,
    RigidTransform, SpatialTransform, Svffd, TemporalDiffeomorphicFfd, Transformation, Vector3,
};
use dirtk_io::{load_transform, read_json, save_transform, write_json};
use tempfile::tempdir;

fn domain() -> ImageDomain {
    ImageDomain::axis_aligned([6, 5, 4], Point3::new(-1.0, 0.5, 2.0), Vector3::new(1.0, 1.2, 0.8)).unwrap()
}

fn filled(mut lattice: ControlLattice, seed: f64) -> ControlLattice {
    let values: Vec<f64> = (0..lattice.num_dofs())
        .map(|i| 0.3 * ((i as f64 + seed) * 0.71).sin())
        .collect();
    lattice.put_all(&values).unwrap();
    for dof in (0..lattice.num_dofs()).step_by(5) {
        lattice.set_status(dof, DofStatus::Passive).unwrap();
    }
    lattice
}

fn all_variants() -> Vec<Transformation> {
    let rk4 = IntegrationConfig::new(IntegrationScheme::RungeKutta4).with_squarings(3, 12);
    let centre = Point3::new(1.5, 2.0, 3.0);

    let mut rigid = RigidTransform::new(Vector3::new(1.0, -2.0, 0.5), Vector3::new(0.1, 0.2, -0.3), centre);
    rigid.set_status(4, DofStatus::Passive).unwrap();
    let affine = AffineTransform::new(
        Vector3::new(0.5, 0.0, -0.5),
        Vector3::new(-0.1, 0.05, 0.2),
        Vector3::new(1.1, 0.9, 1.0),
        Vector3::new(0.02, 0.0, -0.03),
        centre,
    );

    let lattice = ControlLattice::covering(&domain(), 2.0).unwrap();
    let linear = LinearFfd::new(filled(lattice.clone(), 1.0)).unwrap();
    let bspline = BSplineFfd::new(filled(lattice.clone(), 2.0)).unwrap();
    let svffd = Svffd::with_config(filled(lattice.clone(), 3.0), rk4.clone()).unwrap();
    let temporal_lattice = ControlLattice::temporal(lattice.geometry().clone(), 3, 0.0, 0.5).unwrap();
    let temporal = TemporalDiffeomorphicFfd::with_config(filled(temporal_lattice, 4.0), rk4.clone()).unwrap();

    let mut mffd = MultiLevelSvffd::new(affine.clone()).with_config(rk4).unwrap();
    mffd.push_level(Svffd::new(filled(lattice, 5.0)).unwrap());
    mffd.push_level(Svffd::new(filled(ControlLattice::covering(&domain(), 1.0).unwrap(), 6.0)).unwrap());
    mffd.set_level_active(0, false).unwrap();

    vec![
        rigid.into(),
        affine.into(),
        linear.into(),
        bspline.into(),
        svffd.into(),
        temporal.into(),
        mffd.into(),
    ]
}

fn assert_equivalent(expected: &Transformation, actual: &Transformation) {
    assert_eq!(expected.kind(), actual.kind());
    assert_eq!(expected.dofs().unwrap(), actual.dofs().unwrap());
    assert_eq!(expected.dof_status().unwrap(), actual.dof_status().unwrap());
    for p in [Point3::new(0.0, 1.0, 2.5), Point3::new(3.2, 4.1, 3.9)] {
        let a = expected.transform(&p, 0.0, 1.0).unwrap();
        let b = actual.transform(&p, 0.0, 1.0).unwrap();
        assert!((a - b).norm() < 1e-12, "{}: {a:?} vs {b:?}", expected.kind());
    }
}

#[test]
fn test_json_round_trip_all_variants() {
    for transform in all_variants() {
        let mut buffer = Vec::new();
        write_json(&transform, &mut buffer).unwrap();
        let restored = read_json(Cursor::new(buffer)).unwrap();
        assert_equivalent(&transform, &restored);
    }
}

#[test]
fn test_file_round_trip() {
    let dir = tempdir().unwrap();
    for (i, transform) in all_variants().into_iter().enumerate() {
        let path = dir.path().join(format!("transform_{i}.json"));
        save_transform(&transform, &path).unwrap();
        let restored = load_transform(&path).unwrap();
        assert_equivalent(&transform, &restored);
    }
}

#[test]
fn test_multilevel_structure_survives() {
    let transform = all_variants().pop().unwrap();
    let mut buffer = Vec::new();
    write_json(&transform, &mut buffer).unwrap();
    let Transformation::MultiLevel(restored) = read_json(Cursor::new(buffer)).unwrap() else {
        panic!("expected a multi-level transformation");
    };
    assert_eq!(restored.num_levels(), 2);
    assert!(!restored.is_level_active(0));
    assert!(restored.is_level_active(1));
    assert_eq!(restored.config().scheme, IntegrationScheme::RungeKutta4);
    for level in restored.levels() {
        assert_eq!(level.config(), restored.config());
    }
}

#[test]
fn test_levels_follow_multilevel_config() {
    let dense = IntegrationConfig::default().with_displacement(DisplacementMethod::DenseSquaring);
    let mut mffd = MultiLevelSvffd::default().with_config(dense.clone()).unwrap();
    mffd.push_level(Svffd::new(filled(ControlLattice::covering(&domain(), 2.0).unwrap(), 7.0)).unwrap());
    let transform = Transformation::from(mffd);

    let mut buffer = Vec::new();
    write_json(&transform, &mut buffer).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    assert_eq!(json["transform"]["config"]["displacement"], "DenseSquaring");
    assert!(json["transform"]["levels"][0].get("config").is_none());

    let Transformation::MultiLevel(restored) = read_json(Cursor::new(buffer)).unwrap() else {
        panic!("expected a multi-level transformation");
    };
    assert_eq!(restored.config(), &dense);
    assert_eq!(restored.level(0).unwrap().config(), &dense);
}

#[test]
fn test_document_is_tagged() {
    let transform = all_variants().remove(4);
    let mut buffer = Vec::new();
    write_json(&transform, &mut buffer).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    assert_eq!(json["format"], 1);
    assert_eq!(json["transform"]["kind"], "svffd");
    assert_eq!(json["transform"]["config"]["scheme"], "RungeKutta4");
}

#[test]
fn test_unknown_format_is_rejected() {
    let mut buffer = Vec::new();
    write_json(&all_variants()[0], &mut buffer).unwrap();
    let mut json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    json["format"] = serde_json::json!(99);
    let err = read_json(Cursor::new(json.to_string())).unwrap_err();
    assert!(err.to_string().contains("Unsupported transformation format 99"));
}

#[test]
fn test_missing_file_error_does_not_leak_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("private").join("missing.json");
    let err = load_transform(&path).unwrap_err();
    assert!(!err.to_string().contains("private"), "error message leaks path: {err}");
}
