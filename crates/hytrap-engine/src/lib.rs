//! Time-stepping orchestration for hytrap simulations.
//!
//! [`run`] is the one-call entry point: it resolves [`Parameters`]
//! through [`setup::build`], steps a [`Simulation`] to completion and
//! assembles the [`Output`]. The pieces are public for hosts that need
//! finer control, e.g. stepping by hand and inspecting fields between
//! steps.
//!
//! # Step anatomy
//!
//! ```text
//! advance clock ─► ExpressionClock::advance_to(t)
//!   ─► stages in order (temperature, transport, extrinsic traps)
//!        each writes into staging; temperature writes refresh properties
//!   ─► post-processors read a StepView
//!   ─► commit staging (transient only)
//! ```
//!
//! Any failure rolls the step back: staging, clock, expression time and
//! property snapshot return to the last committed state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod export;
pub mod metrics;
pub mod output;
mod overlay;
pub mod parameters;
pub mod postprocess;
pub mod run;
pub mod setup;
pub mod simulation;
pub mod snapshot;
mod store;

pub use clock::SimulationClock;
pub use config::{ConfigurationError, SimulationConfig, SolveMode};
pub use export::ExportError;
pub use metrics::{RunSummary, StepMetrics};
pub use output::{make_output, ErrorNorm, ErrorReport, Output, SolutionField, Solutions};
pub use parameters::Parameters;
pub use postprocess::{DerivedQuantities, DerivedTable, PostProcessError, PostProcessor, StepView};
pub use run::{run, RunError};
pub use setup::Setup;
pub use simulation::Simulation;
pub use snapshot::{CsvSnapshotWriter, FieldExport, SnapshotWriter};
pub use store::CurrentFields;
