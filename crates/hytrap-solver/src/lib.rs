//! Solver stages for the hytrap engine.
//!
//! A [`Subproblem`] is one stage of a step: the heat solve, the coupled
//! transport solve, or an extrinsic trap ODE. Stages declare their field
//! dependencies up front; [`validate_pipeline`] checks them and produces
//! the [`ExecutionPlan`] the engine routes reads through. Each stage
//! receives a [`SolveContext`] with overlay and previous-step readers, a
//! writer for its declared outputs, the mesh, the current
//! [`PropertySnapshot`](hytrap_materials::PropertySnapshot), and the
//! expression clock.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod context;
pub mod extrinsic;
pub mod heat;
pub mod layout;
pub mod newton;
pub mod pipeline;
pub mod subproblem;
pub mod trap;
pub mod transport;

pub use boundary::{
    heat_surface_outflow, transport_surface_outflow, FaceState, HeatBc, HeatBcKind, TransportBc,
    TransportBcKind,
};
pub use context::{SolveContext, StepInfo};
pub use extrinsic::{DamageCreation, ExtrinsicTrapSubproblem, TrapDensityLaw, TrapInputs};
pub use heat::{HeatMode, HeatSubproblem, PrescribedTemperature};
pub use layout::FieldLayout;
pub use newton::{NewtonReport, NewtonSettings, NewtonSolver, NonlinearProblem};
pub use pipeline::{validate_pipeline, ExecutionPlan, PipelineError, ReadSource, WriteConflict};
pub use subproblem::{SolveReport, Subproblem, WriteMode};
pub use trap::{TrapKind, TrapSpec};
pub use transport::{SolveStrategy, TransportSubproblem};
