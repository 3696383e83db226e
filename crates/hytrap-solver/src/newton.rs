//! Damped Newton iteration with a dense LU linear solve.

use hytrap_core::{ConvergenceError, ConvergenceFailure};
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// A square nonlinear system `F(x) = 0`.
pub trait NonlinearProblem {
    /// Number of unknowns.
    fn size(&self) -> usize;

    /// Evaluate the residual and Jacobian at `x`.
    ///
    /// Both outputs are pre-sized and zeroed by the caller.
    fn assemble(&self, x: &DVector<f64>, residual: &mut DVector<f64>, jacobian: &mut DMatrix<f64>);
}

/// Newton stopping criteria.
///
/// Field names match the `solving_parameters.newton_solver` configuration
/// block; every key is optional.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    /// Converged when `|F| < absolute_tolerance`.
    pub absolute_tolerance: f64,
    /// Converged when `|F| / |F0| < relative_tolerance`.
    pub relative_tolerance: f64,
    /// Iteration budget.
    pub maximum_iterations: usize,
    /// Fraction of each Newton update applied.
    pub relaxation_parameter: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            absolute_tolerance: 1e-10,
            relative_tolerance: 1e-9,
            maximum_iterations: 50,
            relaxation_parameter: 1.0,
        }
    }
}

/// Result of a converged solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewtonReport {
    /// Iterations performed; zero if the initial guess already converged.
    pub iterations: usize,
    /// Residual norm at the returned iterate.
    pub residual: f64,
}

/// Newton solver over a [`NonlinearProblem`].
///
/// The Jacobian is a dense `n x n` matrix factorized by LU every
/// iteration: memory grows as `n^2` and each iteration costs `O(n^3)`.
/// At 8 bytes per entry, `n = 10_000` unknowns already needs 800 MB, so
/// this suits 1D meshes and small 2D meshes. A 100x100 rectangle with
/// two traps has `n = 30_000` and does not fit in typical memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewtonSolver {
    settings: NewtonSettings,
}

impl NewtonSolver {
    /// Create a solver with the given settings.
    pub fn new(settings: NewtonSettings) -> Self {
        Self { settings }
    }

    /// The stopping criteria in use.
    pub fn settings(&self) -> &NewtonSettings {
        &self.settings
    }

    /// Solve in place, starting from the current contents of `x`.
    ///
    /// `name` identifies the problem in logs and errors. On failure `x`
    /// holds the last iterate.
    pub fn solve(
        &self,
        name: &str,
        problem: &dyn NonlinearProblem,
        x: &mut DVector<f64>,
    ) -> Result<NewtonReport, ConvergenceError> {
        let n = problem.size();
        let mut residual = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(n, n);
        let fail = |iterations: usize, residual: f64, reason: ConvergenceFailure| ConvergenceError {
            subproblem: name.to_string(),
            iterations,
            residual,
            reason,
        };

        problem.assemble(x, &mut residual, &mut jacobian);
        let initial = residual.norm();
        trace!("{name}: iteration 0, residual {initial:e}");
        if !initial.is_finite() {
            return Err(fail(0, initial, ConvergenceFailure::NonFinite));
        }
        if initial < self.settings.absolute_tolerance {
            return Ok(NewtonReport {
                iterations: 0,
                residual: initial,
            });
        }

        let mut norm = initial;
        for iteration in 1..=self.settings.maximum_iterations {
            let rhs = -&residual;
            // The factorization takes the assembled matrix by value; a
            // fresh zeroed one is allocated once it has been dropped.
            let delta = std::mem::replace(&mut jacobian, DMatrix::zeros(0, 0))
                .lu()
                .solve(&rhs)
                .ok_or_else(|| fail(iteration, norm, ConvergenceFailure::SingularJacobian))?;
            x.axpy(self.settings.relaxation_parameter, &delta, 1.0);

            residual.fill(0.0);
            jacobian = DMatrix::zeros(n, n);
            problem.assemble(x, &mut residual, &mut jacobian);
            norm = residual.norm();
            trace!(
                "{name}: iteration {iteration}, residual {norm:e} (relative {:e})",
                norm / initial
            );

            if !norm.is_finite() {
                return Err(fail(iteration, norm, ConvergenceFailure::NonFinite));
            }
            if norm < self.settings.absolute_tolerance
                || norm / initial < self.settings.relative_tolerance
            {
                debug!("{name}: converged in {iteration} iterations, residual {norm:e}");
                return Ok(NewtonReport {
                    iterations: iteration,
                    residual: norm,
                });
            }
        }

        Err(fail(
            self.settings.maximum_iterations,
            norm,
            ConvergenceFailure::MaxIterations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `x_i^2 - a_i = 0`.
    struct Squares(Vec<f64>);

    impl NonlinearProblem for Squares {
        fn size(&self) -> usize {
            self.0.len()
        }
        fn assemble(&self, x: &DVector<f64>, r: &mut DVector<f64>, j: &mut DMatrix<f64>) {
            for (i, a) in self.0.iter().enumerate() {
                r[i] = x[i] * x[i] - a;
                j[(i, i)] = 2.0 * x[i];
            }
        }
    }

    /// Same system as [`Squares`], assembled with `+=` so it depends on
    /// the caller zeroing both outputs before every call.
    struct AccumulatedSquares(Vec<f64>);

    impl NonlinearProblem for AccumulatedSquares {
        fn size(&self) -> usize {
            self.0.len()
        }
        fn assemble(&self, x: &DVector<f64>, r: &mut DVector<f64>, j: &mut DMatrix<f64>) {
            for (i, a) in self.0.iter().enumerate() {
                r[i] += x[i] * x[i] - a;
                j[(i, i)] += 2.0 * x[i];
            }
        }
    }

    /// `x + y = 3`, `x - y = 1`.
    struct Linear;

    impl NonlinearProblem for Linear {
        fn size(&self) -> usize {
            2
        }
        fn assemble(&self, x: &DVector<f64>, r: &mut DVector<f64>, j: &mut DMatrix<f64>) {
            r[0] = x[0] + x[1] - 3.0;
            r[1] = x[0] - x[1] - 1.0;
            j[(0, 0)] = 1.0;
            j[(0, 1)] = 1.0;
            j[(1, 0)] = 1.0;
            j[(1, 1)] = -1.0;
        }
    }

    #[test]
    fn linear_system_converges_in_one_iteration() {
        let mut x = DVector::zeros(2);
        let report = NewtonSolver::default().solve("linear", &Linear, &mut x).unwrap();
        assert_eq!(report.iterations, 1);
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn square_roots() {
        let mut x = DVector::from_element(2, 1.0);
        NewtonSolver::default()
            .solve("sqrt", &Squares(vec![4.0, 9.0]), &mut x)
            .unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn jacobian_is_zeroed_between_iterations() {
        let targets = vec![4.0, 9.0, 16.0, 25.0];
        let mut plain = DVector::from_element(4, 1.0);
        let expected = NewtonSolver::default()
            .solve("sqrt", &Squares(targets.clone()), &mut plain)
            .unwrap();
        let mut x = DVector::from_element(4, 1.0);
        let report = NewtonSolver::default()
            .solve("sqrt", &AccumulatedSquares(targets), &mut x)
            .unwrap();
        assert!(report.iterations > 2);
        assert_eq!(report.iterations, expected.iterations);
        for (i, root) in [2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
            assert_relative_eq!(x[i], root, epsilon = 1e-9);
        }
    }

    #[test]
    fn converged_guess_takes_zero_iterations() {
        let mut x = DVector::from_vec(vec![2.0, 1.0]);
        let report = NewtonSolver::default().solve("linear", &Linear, &mut x).unwrap();
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn singular_jacobian_reported() {
        // Zero derivative at the starting point.
        let mut x = DVector::zeros(1);
        let err = NewtonSolver::default()
            .solve("sqrt", &Squares(vec![4.0]), &mut x)
            .unwrap_err();
        assert_eq!(err.reason, ConvergenceFailure::SingularJacobian);
        assert_eq!(err.subproblem, "sqrt");
    }

    #[test]
    fn iteration_budget_enforced() {
        // x^2 + 1 = 0 has no real root.
        let mut x = DVector::from_element(1, 0.5);
        let solver = NewtonSolver::new(NewtonSettings {
            maximum_iterations: 5,
            ..NewtonSettings::default()
        });
        let err = solver.solve("none", &Squares(vec![-1.0]), &mut x).unwrap_err();
        assert_eq!(err.reason, ConvergenceFailure::MaxIterations);
        assert_eq!(err.iterations, 5);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let s: NewtonSettings =
            serde_json::from_str(r#"{"absolute_tolerance": 1e10, "maximum_iterations": 30}"#)
                .unwrap();
        assert_eq!(s.absolute_tolerance, 1e10);
        assert_eq!(s.maximum_iterations, 30);
        assert_eq!(s.relative_tolerance, 1e-9);
        assert_eq!(s.relaxation_parameter, 1.0);
    }
}
