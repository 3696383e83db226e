//! The [`Subproblem`] trait and [`WriteMode`] enum.
//!
//! Subproblems are stateless stages executed in sequence each step. They
//! declare field dependencies at construction, enabling the engine to
//! validate the pipeline and precompute overlay routing.

use hytrap_core::{FieldId, FieldSet, SolveError};

use crate::context::SolveContext;

/// Write initialization strategy for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Zeroed buffer. The stage must fill every value.
    Full,
    /// Buffer seeded from the committed generation. Newton stages use
    /// this so the previous solution is the initial guess.
    Incremental,
}

/// Outcome of a successful [`Subproblem::solve`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveReport {
    /// Newton iterations performed. Zero for stages that only evaluate.
    pub iterations: usize,
    /// Final residual norm, zero for evaluation-only stages.
    pub residual: f64,
}

/// One stage of a simulation step.
///
/// # Contract
///
/// - `solve()` must be deterministic: same inputs produce identical outputs.
/// - `&self`: stages are stateless; everything that evolves lives in fields.
/// - `reads()`, `reads_previous()` and `writes()` are called once at
///   pipeline construction, not per step.
///
/// # Examples
///
/// ```
/// use hytrap_core::{FieldId, FieldSet, SolveError};
/// use hytrap_solver::{SolveContext, SolveReport, Subproblem, WriteMode};
///
/// struct Fill {
///     field: FieldId,
///     value: f64,
/// }
///
/// impl Subproblem for Fill {
///     fn name(&self) -> &str { "fill" }
///     fn reads(&self) -> FieldSet { FieldSet::empty() }
///     fn writes(&self) -> Vec<(FieldId, WriteMode)> {
///         vec![(self.field, WriteMode::Full)]
///     }
///     fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
///         let field = self.field;
///         ctx.write(field)?.fill(self.value);
///         Ok(SolveReport::default())
///     }
/// }
///
/// let stage = Fill { field: FieldId(0), value: 300.0 };
/// assert_eq!(stage.name(), "fill");
/// ```
pub trait Subproblem: Send + 'static {
    /// Human-readable name for logs and error reports.
    fn name(&self) -> &str;

    /// Fields read through the in-step overlay.
    ///
    /// Reading through `ctx.reads()` sees values written by earlier stages
    /// in the current step.
    fn reads(&self) -> FieldSet;

    /// Fields read from the committed generation (the previous step).
    ///
    /// Default: empty set.
    fn reads_previous(&self) -> FieldSet {
        FieldSet::empty()
    }

    /// Fields written, with their initialization mode.
    fn writes(&self) -> Vec<(FieldId, WriteMode)>;

    /// Run the stage for one step.
    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError>;
}
