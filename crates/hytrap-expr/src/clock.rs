//! The expression registry owned by the time-stepping engine.

use std::fmt;

use hytrap_core::Point;
use indexmap::IndexMap;

use crate::expression::Expression;

/// Handle to an expression registered with an [`ExpressionClock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpressionId(pub u32);

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of every expression a simulation reads, synchronized to a
/// single simulation time.
///
/// Stages register their inputs at construction and keep the returned
/// [`ExpressionId`]s. The engine calls [`advance_to`](Self::advance_to)
/// exactly once per step, before any stage runs; evaluation always uses
/// the clock's time, so every input sees the same `t`.
///
/// # Examples
///
/// ```
/// use hytrap_expr::{Expression, ExpressionClock};
///
/// let mut clock = ExpressionClock::new();
/// let id = clock.register("left.value", Expression::transient(|_, t| 2.0 * t));
/// clock.advance_to(1.5);
/// assert_eq!(clock.evaluate(id, &[0.0; 3]), 3.0);
/// ```
#[derive(Debug, Default)]
pub struct ExpressionClock {
    entries: IndexMap<String, Expression>,
    time: f64,
}

impl ExpressionClock {
    /// Create an empty registry at `t = 0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expression under a unique name.
    ///
    /// Re-registering a name replaces its expression and returns the
    /// existing handle.
    pub fn register(&mut self, name: impl Into<String>, expr: Expression) -> ExpressionId {
        let (index, _) = self.entries.insert_full(name.into(), expr);
        ExpressionId(index as u32)
    }

    /// Synchronize every registered expression to time `t`.
    pub fn advance_to(&mut self, t: f64) {
        self.time = t;
    }

    /// The time all expressions are currently evaluated at.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Evaluate an expression at the clock's time.
    ///
    /// Returns NaN for an unknown handle; downstream non-finite checks
    /// turn that into a stage error.
    pub fn evaluate(&self, id: ExpressionId, point: &Point) -> f64 {
        self.evaluate_at(id, point, self.time)
    }

    /// Evaluate an expression at an explicit time.
    pub fn evaluate_at(&self, id: ExpressionId, point: &Point, t: f64) -> f64 {
        self.entries
            .get_index(id.0 as usize)
            .map_or(f64::NAN, |(_, e)| e.evaluate(point, t))
    }

    /// Look up a handle by name.
    pub fn id_of(&self, name: &str) -> Option<ExpressionId> {
        self.entries
            .get_index_of(name)
            .map(|i| ExpressionId(i as u32))
    }

    /// The expression behind a handle.
    pub fn expression(&self, id: ExpressionId) -> Option<&Expression> {
        self.entries.get_index(id.0 as usize).map(|(_, e)| e)
    }

    /// Number of registered expressions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of registered expressions whose value depends on time.
    pub fn time_dependent_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.is_time_dependent())
            .count()
    }
}
