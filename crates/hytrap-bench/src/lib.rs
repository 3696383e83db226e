//! Benchmark profiles for the hytrap transport engine.
//!
//! Provides pre-built [`Parameters`] profiles for benchmarking:
//!
//! - [`reference_profile`]: 1D slab, two traps, recombination outlet,
//!   temperature ramp
//! - [`stress_profile`]: the same physics on a 10x finer mesh
//! - [`heat_profile`]: transient heat conduction coupled to transport

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use hytrap_engine::parameters::{
    BoundaryConditionParameters, InitialCondition, MeshParameters, RefinementParameters,
    SolvingParameters, TemperatureParameters, TrapParameters,
};
use hytrap_engine::Parameters;
use hytrap_expr::Expression;
use hytrap_materials::Material;

fn slab(cells: usize, final_time: f64) -> Parameters {
    Parameters {
        mesh_parameters: MeshParameters::Interval {
            size: 1.0,
            initial_number_of_cells: cells,
            refinements: vec![RefinementParameters {
                cells: cells / 2,
                x: 0.05,
            }],
        },
        materials: vec![Material::new(1, 1.0, 0.02)],
        traps: vec![
            TrapParameters::intrinsic(1.0, 0.02, 0.1, 0.3, 0.5, &[1]),
            TrapParameters::intrinsic(1.0, 0.02, 0.01, 0.6, 0.1, &[1]),
        ],
        boundary_conditions: vec![
            BoundaryConditionParameters::dirichlet(&[1], 1.0),
            BoundaryConditionParameters::recombination(&[2], 1.0, 0.0),
        ],
        source_term: None,
        initial_conditions: vec![InitialCondition {
            value: 0.0.into(),
            component: 0,
        }],
        temperature: TemperatureParameters::expression(Expression::transient(|_, t| {
            300.0 + 10.0 * t
        })),
        solving_parameters: SolvingParameters::transient(final_time, 0.01),
        exports: Default::default(),
    }
}

/// Build the reference benchmark profile: 100 cells plus a refined
/// layer near the inlet.
///
/// Pipeline: PrescribedTemperature → Transport (three components).
/// `final_time` bounds the run; step benchmarks pass a large value.
pub fn reference_profile(final_time: f64) -> Parameters {
    slab(100, final_time)
}

/// Build the stress benchmark profile: 1000 cells.
///
/// Same pipeline as [`reference_profile`] at 10x the cell count.
pub fn stress_profile(final_time: f64) -> Parameters {
    slab(1000, final_time)
}

/// Build a profile that solves the heat equation every step.
///
/// Pipeline: Heat → Transport.
pub fn heat_profile(final_time: f64) -> Parameters {
    let mut p = slab(100, final_time);
    p.materials = vec![Material::new(1, 1.0, 0.02).with_thermal(1.0.into(), 1.0.into(), 1.0.into())];
    p.temperature = TemperatureParameters {
        kind: "solve_transient".into(),
        value: None,
        initial_condition: Some(300.0.into()),
        boundary_conditions: vec![
            BoundaryConditionParameters::dirichlet(&[1], 400.0),
            BoundaryConditionParameters::dirichlet(&[2], 300.0),
        ],
        ..TemperatureParameters::expression(300.0)
    };
    p
}
