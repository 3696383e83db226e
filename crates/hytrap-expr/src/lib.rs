//! Expressions and the expression clock.
//!
//! An [`Expression`] is a boundary value, source term, or density given
//! either as a constant or as a closure of position and time. Every
//! expression used by a solver stage is registered with an
//! [`ExpressionClock`] at setup; the engine moves the clock once per step
//! and stages evaluate their inputs through it, so no input can lag the
//! simulation time.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod expression;

pub use clock::{ExpressionClock, ExpressionId};
pub use expression::Expression;
pub use hytrap_core::Point;
