//! Error types shared by the solver stages and the time-stepping engine.
//!
//! Organized by layer: Newton convergence, individual stage execution,
//! and whole-step execution.

use std::error::Error;
use std::fmt;

use crate::id::FieldId;

/// Why a Newton iteration stopped without converging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceFailure {
    /// The iteration budget was exhausted.
    MaxIterations,
    /// The residual became NaN or infinite.
    NonFinite,
    /// The linearized system could not be factorized.
    SingularJacobian,
}

impl fmt::Display for ConvergenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxIterations => write!(f, "maximum iterations reached"),
            Self::NonFinite => write!(f, "residual is not finite"),
            Self::SingularJacobian => write!(f, "jacobian is singular"),
        }
    }
}

/// A Newton solve failed to meet its tolerance.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceError {
    /// Name of the problem being solved.
    pub subproblem: String,
    /// Iterations performed before giving up.
    pub iterations: usize,
    /// Residual norm at the last iterate.
    pub residual: f64,
    /// Why the iteration stopped.
    pub reason: ConvergenceFailure,
}

impl fmt::Display for ConvergenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' did not converge after {} iterations (residual {:e}): {}",
            self.subproblem, self.iterations, self.residual, self.reason
        )
    }
}

impl Error for ConvergenceError {}

/// Errors from a single solver stage.
///
/// Returned by `Subproblem::solve()` and wrapped in
/// [`StepError::SubproblemFailed`] by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveError {
    /// Newton iteration failed.
    Convergence(ConvergenceError),
    /// A field was requested that the stage did not declare, or that
    /// does not exist.
    FieldUnavailable {
        /// The requested field.
        field: FieldId,
    },
    /// A field buffer has an unexpected length.
    SizeMismatch {
        /// The field.
        field: FieldId,
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },
    /// A stage wrote a NaN or infinite value.
    NanDetected {
        /// The field containing the value.
        field: FieldId,
        /// Index of the first offending slot, if known.
        index: Option<usize>,
    },
    /// The stage could not run with the state it was given.
    InvalidState {
        /// Human-readable description.
        reason: String,
    },
}

impl SolveError {
    /// Returns `true` for Newton convergence failures.
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::Convergence(_))
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convergence(e) => write!(f, "convergence: {e}"),
            Self::FieldUnavailable { field } => write!(f, "field {field} not accessible"),
            Self::SizeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "field {field} has {actual} values, expected {expected}"
            ),
            Self::NanDetected { field, index } => {
                write!(f, "non-finite value in field {field}")?;
                if let Some(idx) = index {
                    write!(f, " at slot {idx}")?;
                }
                Ok(())
            }
            Self::InvalidState { reason } => write!(f, "invalid state: {reason}"),
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Convergence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConvergenceError> for SolveError {
    fn from(e: ConvergenceError) -> Self {
        Self::Convergence(e)
    }
}

/// Errors from executing one time step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// A solver stage failed; the step was rolled back.
    SubproblemFailed {
        /// Name of the failing stage.
        name: String,
        /// The underlying stage error.
        reason: SolveError,
    },
    /// The post-processing sink failed; the step was rolled back.
    PostProcessingFailed {
        /// Human-readable description.
        reason: String,
    },
    /// Adaptive step control reduced the step below its lower bound.
    StepSizeUnderflow {
        /// The step size that would have been attempted next.
        dt: f64,
        /// The configured lower bound.
        dt_min: f64,
    },
    /// A step was requested after the clock reached its final time.
    Finished,
}

impl StepError {
    /// Returns `true` if the failure was a Newton convergence failure.
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::SubproblemFailed { reason, .. } if reason.is_convergence())
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubproblemFailed { name, reason } => {
                write!(f, "stage '{name}' failed: {reason}")
            }
            Self::PostProcessingFailed { reason } => {
                write!(f, "post-processing failed: {reason}")
            }
            Self::StepSizeUnderflow { dt, dt_min } => {
                write!(f, "step size {dt:e} fell below dt_min {dt_min:e}")
            }
            Self::Finished => write!(f, "simulation already reached its final time"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubproblemFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
