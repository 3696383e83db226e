//! hytrap: hydrogen transport and trapping in materials.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all hytrap sub-crates. For most users, adding `hytrap` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use hytrap::prelude::*;
//! use hytrap::engine::parameters::{
//!     BoundaryConditionParameters, MeshParameters, SolvingParameters, TemperatureParameters,
//! };
//!
//! // Steady diffusion through a unit slab held at 0 and 1.
//! let parameters = Parameters {
//!     mesh_parameters: MeshParameters::Interval {
//!         size: 1.0,
//!         initial_number_of_cells: 20,
//!         refinements: Vec::new(),
//!     },
//!     materials: vec![Material::new(1, 1.0, 0.0)],
//!     traps: Vec::new(),
//!     boundary_conditions: vec![
//!         BoundaryConditionParameters::dirichlet(&[1], 0.0),
//!         BoundaryConditionParameters::dirichlet(&[2], 1.0),
//!     ],
//!     source_term: None,
//!     initial_conditions: Vec::new(),
//!     temperature: TemperatureParameters::expression(300.0),
//!     solving_parameters: SolvingParameters::stationary(),
//!     exports: Default::default(),
//! };
//! let output = run(parameters).unwrap();
//! assert_eq!(output.summary.steps, 1);
//! assert_eq!(output.solutions.solute.len(), 20);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `hytrap-core` | IDs, field definitions, errors, field access traits |
//! | [`mesh`] | `hytrap-mesh` | Interval and rectangle meshes with markers |
//! | [`expr`] | `hytrap-expr` | Expressions and the expression clock |
//! | [`materials`] | `hytrap-materials` | Property laws, materials, property snapshots |
//! | [`solver`] | `hytrap-solver` | Subproblems, pipeline validation, Newton solver |
//! | [`engine`] | `hytrap-engine` | Parameters, setup, time stepping and exports |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`hytrap-core`).
///
/// Contains field definitions, the solve and step error types, and the
/// field access traits ([`types::FieldReader`], [`types::FieldWriter`]).
pub use hytrap_core as types;

/// Meshes (`hytrap-mesh`).
///
/// Provides the [`mesh::Mesh`] trait with [`mesh::IntervalMesh`] and
/// [`mesh::RectangleMesh`].
pub use hytrap_mesh as mesh;

/// Expressions of space and time (`hytrap-expr`).
///
/// [`expr::ExpressionClock`] keeps every registered
/// [`expr::Expression`] evaluated at the current simulation time.
pub use hytrap_expr as expr;

/// Material property laws (`hytrap-materials`).
pub use hytrap_materials as materials;

/// Subproblems and solvers (`hytrap-solver`).
///
/// The [`solver::Subproblem`] trait is the extension point for stages
/// of a time step.
pub use hytrap_solver as solver;

/// Setup, time stepping and exports (`hytrap-engine`).
///
/// [`engine::run`] runs a whole simulation; [`engine::Simulation`] can
/// be stepped by hand.
pub use hytrap_engine as engine;

/// Common imports for typical hytrap usage.
///
/// ```rust
/// use hytrap::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use hytrap_core::{
        FieldDef, FieldId, FieldReader, FieldSet, FieldType, FieldWriter, SolveError, StepError,
    };

    // Mesh
    pub use hytrap_mesh::{IntervalMesh, Mesh, RectangleMesh};

    // Expressions
    pub use hytrap_expr::{Expression, ExpressionClock};

    // Materials
    pub use hytrap_materials::{Material, MaterialTable};

    // Solver
    pub use hytrap_solver::{FieldLayout, SolveContext, SolveReport, Subproblem, WriteMode};

    // Engine
    pub use hytrap_engine::{
        run, Output, Parameters, RunError, Simulation, SimulationConfig, SolveMode,
    };
}
