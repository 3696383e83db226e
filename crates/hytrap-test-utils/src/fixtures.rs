//! Reusable subproblem test fixtures.
//!
//! Four stages for pipeline validation and engine testing:
//!
//! - [`CopyStage`] copies one field into another (Full mode).
//! - [`ConstStage`] writes a constant (Full mode, no reads).
//! - [`FailingStage`] fails with a convergence error after N calls.
//! - [`CountingStage`] increments its output and reports a fixed
//!   iteration count, for step-size control tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use hytrap_core::{ConvergenceError, ConvergenceFailure, FieldId, FieldSet, SolveError};
use hytrap_solver::{SolveContext, SolveReport, Subproblem, WriteMode};

/// Reads one field and copies it to another (Full write mode).
///
/// If the output matches the input, overlay routing is working.
pub struct CopyStage {
    pub name: String,
    pub input: FieldId,
    pub output: FieldId,
}

impl CopyStage {
    pub fn new(name: impl Into<String>, input: FieldId, output: FieldId) -> Self {
        Self {
            name: name.into(),
            input,
            output,
        }
    }
}

impl Subproblem for CopyStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        [self.input].into_iter().collect()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.output, WriteMode::Full)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let input = ctx.read(self.input)?;
        let output = ctx.write(self.output)?;
        if output.len() != input.len() {
            return Err(SolveError::SizeMismatch {
                field: self.output,
                expected: input.len(),
                actual: output.len(),
            });
        }
        output.copy_from_slice(input);
        Ok(SolveReport::default())
    }
}

/// Writes a constant value to every cell (Full write mode, no reads).
pub struct ConstStage {
    pub name: String,
    pub output: FieldId,
    pub value: f64,
}

impl ConstStage {
    pub fn new(name: impl Into<String>, output: FieldId, value: f64) -> Self {
        Self {
            name: name.into(),
            output,
            value,
        }
    }
}

impl Subproblem for ConstStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.output, WriteMode::Full)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let output = self.output;
        ctx.write(output)?.fill(self.value);
        Ok(SolveReport::default())
    }
}

/// Fails deterministically after a configurable number of successful calls.
///
/// The failure is a [`ConvergenceError`], so it exercises step-size
/// reduction as well as rollback. Uses `AtomicUsize` so it is `Send`.
pub struct FailingStage {
    pub name: String,
    pub output: FieldId,
    pub succeed_count: usize,
    call_count: AtomicUsize,
}

impl FailingStage {
    /// Create a stage that succeeds `succeed_count` times then fails.
    pub fn new(name: impl Into<String>, output: FieldId, succeed_count: usize) -> Self {
        Self {
            name: name.into(),
            output,
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many times `solve()` has been called.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Subproblem for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.output, WriteMode::Incremental)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(ConvergenceError {
                subproblem: self.name.clone(),
                iterations: 1,
                residual: f64::INFINITY,
                reason: ConvergenceFailure::MaxIterations,
            }
            .into());
        }
        // Call index for traceability.
        let output = self.output;
        ctx.write(output)?.fill(n as f64);
        Ok(SolveReport::default())
    }
}

/// Adds one to its output every call and reports `iterations`.
///
/// The output only advances on committed steps, while
/// [`calls`](CountingStage::calls) also counts rolled-back attempts.
pub struct CountingStage {
    pub name: String,
    pub output: FieldId,
    pub iterations: usize,
    call_count: AtomicUsize,
}

impl CountingStage {
    pub fn new(name: impl Into<String>, output: FieldId, iterations: usize) -> Self {
        Self {
            name: name.into(),
            output,
            iterations,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Subproblem for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.output, WriteMode::Incremental)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let output = self.output;
        for value in ctx.write(output)?.iter_mut() {
            *value += 1.0;
        }
        Ok(SolveReport {
            iterations: self.iterations,
            residual: 0.0,
        })
    }
}
