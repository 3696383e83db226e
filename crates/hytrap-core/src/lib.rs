//! Core types and traits for the hytrap transport engine.
//!
//! This is the leaf crate of the workspace. It defines the identifiers,
//! field descriptors, error taxonomy, and field access traits shared by
//! the solver stages and the time-stepping engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod field;
pub mod id;
pub mod traits;

pub use error::{ConvergenceError, ConvergenceFailure, SolveError, StepError};
pub use field::{FieldDef, FieldSet, FieldSetIter, FieldType};
pub use id::{FieldId, Point, StepIndex};
pub use traits::{FieldReader, FieldWriter};
