//! Integration tests: whole runs through `hytrap_engine::run`.
//!
//! Covers mode resolution, the stationary single-solve path, transient
//! step counts, solved temperature and the derived-quantity export.

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use hytrap_core::FieldReader;
use hytrap_engine::parameters::{
    BoundaryConditionParameters, DerivedQuantitiesParameters, InitialCondition, MeshParameters,
    SolvingParameters, SurfaceQuantity, TemperatureParameters, VolumeQuantity,
};
use hytrap_engine::{run, setup, ConfigurationError, Parameters, RunError, Simulation};
use hytrap_materials::Material;
use hytrap_mesh::Mesh;

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("hytrap-run-{}-{name}", std::process::id()))
}

fn diffusion(solving: SolvingParameters) -> Parameters {
    Parameters {
        mesh_parameters: MeshParameters::Interval {
            size: 1.0,
            initial_number_of_cells: 10,
            refinements: Vec::new(),
        },
        materials: vec![Material::new(1, 1.0, 0.0)],
        traps: Vec::new(),
        boundary_conditions: Vec::new(),
        source_term: None,
        initial_conditions: Vec::new(),
        temperature: TemperatureParameters::expression(300.0),
        solving_parameters: solving,
        exports: Default::default(),
    }
}

#[test]
fn unknown_solving_type_fails_before_solving() {
    let mut p = diffusion(SolvingParameters::stationary());
    p.solving_parameters.kind = Some("solve_later".into());
    match run(p) {
        Err(RunError::Configuration(ConfigurationError::UnknownSolvingType { value })) => {
            assert_eq!(value, "solve_later")
        }
        other => panic!("expected UnknownSolvingType, got {other:?}"),
    }
}

#[test]
fn stationary_diffusion_is_linear() {
    let dir = scratch("stationary");
    let mut p = diffusion(SolvingParameters::stationary());
    p.boundary_conditions = vec![
        BoundaryConditionParameters::dirichlet(&[1], 0.0),
        BoundaryConditionParameters::dirichlet(&[2], 1.0),
    ];
    p.exports.derived_quantities = Some(DerivedQuantitiesParameters {
        file: "derived_quantities.csv".into(),
        folder: dir.to_string_lossy().into_owned(),
        surface_flux: vec![SurfaceQuantity {
            field: "solute".into(),
            surfaces: vec![1, 2],
        }],
        ..Default::default()
    });

    let out = run(p).unwrap();
    assert_eq!(out.summary.steps, 1);
    for (c, &u) in out.solutions.solute.iter().enumerate() {
        let x = out.mesh.centroid(c)[0];
        assert_relative_eq!(u, x, epsilon = 1e-9);
    }
    assert_eq!(out.solutions.retention, out.solutions.solute);

    // Outward-positive: hydrogen enters on the right and leaves on the left.
    let table = out.derived_quantities.unwrap();
    assert_eq!(table.header, ["t(s)", "Flux surface 1: solute", "Flux surface 2: solute"]);
    assert_eq!(table.rows.len(), 1);
    assert_relative_eq!(table.rows[0][1], 1.0, epsilon = 1e-8);
    assert_relative_eq!(table.rows[0][2], -1.0, epsilon = 1e-8);

    let csv = fs::read_to_string(dir.join("derived_quantities.csv")).unwrap();
    assert!(csv.starts_with("t(s),Flux surface 1: solute,Flux surface 2: solute\n"));
    assert_eq!(csv.lines().count(), 2);
    fs::remove_dir_all(dir).ok();
}

#[test]
fn transient_run_counts_steps_and_conserves_mass() {
    let mut p = diffusion(SolvingParameters::transient(1.0, 0.3));
    p.initial_conditions = vec![InitialCondition {
        value: 2.0.into(),
        component: 0,
    }];
    p.exports.derived_quantities = Some(DerivedQuantitiesParameters {
        file: "unused".into(),
        folder: scratch("transient").to_string_lossy().into_owned(),
        total_volume: vec![VolumeQuantity {
            field: "retention".into(),
            volumes: vec![1],
        }],
        ..Default::default()
    });

    let out = run(p).unwrap();
    assert_eq!(out.summary.steps, 4);
    assert!(out.summary.final_time >= 1.0 && out.summary.final_time < 1.3);
    for &c in &out.solutions.solute {
        assert_relative_eq!(c, 2.0, max_relative = 1e-10);
    }
    let table = out.derived_quantities.unwrap();
    let times = table.column("t(s)").unwrap();
    assert_eq!(times.len(), 4);
    for total in table.column("Total retention volume 1").unwrap() {
        assert_relative_eq!(total, 2.0, max_relative = 1e-10);
    }
    fs::remove_dir_all(scratch("transient")).ok();
}

#[test]
fn trapping_moves_hydrogen_out_of_solution() {
    let mut p = diffusion(SolvingParameters::transient(10.0, 1.0));
    p.initial_conditions = vec![InitialCondition {
        value: 1.0.into(),
        component: 0,
    }];
    p.traps = vec![hytrap_engine::parameters::TrapParameters::intrinsic(
        1.0, 0.0, 0.1, 0.0, 1.0, &[1],
    )];

    let out = run(p).unwrap();
    let trapped = &out.solutions.traps[0];
    for c in 0..out.solutions.solute.len() {
        assert!(trapped[c] > 0.0);
        assert!(out.solutions.solute[c] < 1.0);
        // No boundaries: total inventory is conserved.
        assert_relative_eq!(out.solutions.retention[c], 1.0, max_relative = 1e-6);
    }
}

#[test]
fn error_norm_against_exact_profile() {
    let mut p = diffusion(SolvingParameters::stationary());
    p.boundary_conditions = vec![
        BoundaryConditionParameters::dirichlet(&[1], 0.0),
        BoundaryConditionParameters::dirichlet(&[2], 1.0),
    ];
    p.exports.error = Some(vec![hytrap_engine::parameters::ErrorParameters {
        exact_solutions: vec![hytrap_expr::Expression::spatial(|x| x[0])],
        computed_solutions: vec![0],
        norm: "error_max".into(),
    }]);
    let out = run(p).unwrap();
    let errors = out.error.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].values[0] < 1e-8);
}

/// A slab held at 400 K on the left and 300 K on the right, with an
/// activated diffusivity so transport depends on temperature.
fn heated_slab(solving: SolvingParameters, heat: &str) -> Parameters {
    let mut p = diffusion(solving);
    p.materials = vec![Material::new(1, 1.0, 0.1).with_thermal(3.0.into(), 1.0.into(), 1.0.into())];
    p.temperature = TemperatureParameters {
        kind: heat.into(),
        value: None,
        initial_condition: Some(300.0.into()),
        boundary_conditions: vec![
            BoundaryConditionParameters::dirichlet(&[1], 400.0),
            BoundaryConditionParameters::dirichlet(&[2], 300.0),
        ],
        source: None,
        soret: false,
    };
    p
}

#[test]
fn time_settings_rejected_before_heat_presolve() {
    let mut p = diffusion(SolvingParameters::transient(1.0, -1.0));
    // Zero conductivity with a source: the steady heat solve would fail.
    p.materials = vec![Material::new(1, 1.0, 0.0).with_thermal(0.0.into(), 1.0.into(), 1.0.into())];
    p.temperature = TemperatureParameters {
        kind: "solve_stationary".into(),
        value: None,
        initial_condition: Some(300.0.into()),
        boundary_conditions: Vec::new(),
        source: Some(1.0.into()),
        soret: false,
    };
    match run(p) {
        Err(RunError::Configuration(ConfigurationError::InvalidValue { key, .. })) => {
            assert_eq!(key, "initial_stepsize")
        }
        other => panic!("expected InvalidValue for initial_stepsize, got {other:?}"),
    }
}

#[test]
fn steady_temperature_is_solved_before_transport() {
    let mut p = heated_slab(SolvingParameters::stationary(), "solve_stationary");
    p.boundary_conditions = vec![
        BoundaryConditionParameters::dirichlet(&[1], 0.0),
        BoundaryConditionParameters::dirichlet(&[2], 1.0),
    ];

    // The engine starts from properties at the solved temperature.
    let mut s = setup::build(&p).unwrap();
    s.resolve_initial_state().unwrap();
    let sim = Simulation::new(s.config).unwrap();
    let t = sim.current().read(sim.layout().temperature).unwrap().to_vec();
    assert_eq!(sim.properties(), &sim.materials().refresh(&t).unwrap());
    assert!(sim.properties().diffusivity[0] > 2.0 * sim.properties().diffusivity[9]);

    let out = run(p).unwrap();
    assert_eq!(out.summary.steps, 1);
    for (c, &temperature) in out.solutions.temperature.iter().enumerate() {
        let x = out.mesh.centroid(c)[0];
        assert_relative_eq!(temperature, 400.0 - 100.0 * x, epsilon = 1e-6);
    }
    // Faster diffusion on the hot side bends the profile below the chord.
    let middle = out.solutions.solute[4];
    assert!(middle > 0.0 && middle < 0.4, "solute at x = 0.45 is {middle}");
    assert_eq!(out.solutions.retention, out.solutions.solute);
}

#[test]
fn transient_temperature_refreshes_properties_every_step() {
    let p = heated_slab(SolvingParameters::transient(1.0, 0.25), "solve_transient");
    let mut s = setup::build(&p).unwrap();
    s.resolve_initial_state().unwrap();
    let mut sim = Simulation::new(s.config).unwrap();
    let t_id = sim.layout().temperature;

    let mut hot_side = 300.0;
    while !sim.clock().is_finished() {
        sim.step().unwrap();
        let t = sim.current().read(t_id).unwrap().to_vec();
        // Heat flows in from the left and the profile stays monotone.
        assert!(t[0] > hot_side);
        hot_side = t[0];
        assert!(t.windows(2).all(|w| w[0] >= w[1] - 1e-9));
        assert!(t.iter().all(|&v| v > 300.0 - 1e-9 && v < 400.0 + 1e-9));
        // Transport ran against properties at this step's temperature.
        assert_eq!(sim.properties(), &sim.materials().refresh(&t).unwrap());
    }
    assert_eq!(sim.commit_count(), 4);
    assert_eq!(sim.previous().read(t_id), sim.current().read(t_id));

    let out = run(p).unwrap();
    assert_eq!(out.summary.steps, 4);
    assert_relative_eq!(out.solutions.temperature[0], hot_side, max_relative = 1e-12);
}
