//! Extrinsic trap densities.
//!
//! An extrinsic trap's site density is not fixed: it grows under
//! irradiation according to a [`TrapDensityLaw`], integrated with
//! backward Euler once per step, after the transport solve has produced
//! the step's concentrations. The transport stage reads the density from
//! the previous commit, so the two are coupled explicitly.

use hytrap_core::{ConvergenceError, ConvergenceFailure, FieldId, FieldSet, Point, SolveError};
use hytrap_expr::{ExpressionClock, ExpressionId};

use crate::context::SolveContext;
use crate::subproblem::{SolveReport, Subproblem, WriteMode};

const MAX_ITERATIONS: usize = 50;
const TOLERANCE: f64 = 1e-12;

/// Local state a density law may depend on.
#[derive(Clone, Copy, Debug)]
pub struct TrapInputs {
    /// Physical mobile concentration.
    pub mobile: f64,
    /// Concentration held by this trap.
    pub trapped: f64,
    /// Temperature, K.
    pub temperature: f64,
    /// Cell centroid.
    pub point: Point,
    /// Simulation time.
    pub time: f64,
}

/// Creation rate of trap sites, `dn/dt = R(n, ...)`.
pub trait TrapDensityLaw: Send + Sync {
    /// Rate and its derivative with respect to `n`.
    fn rate(&self, n: f64, inputs: &TrapInputs, clock: &ExpressionClock) -> (f64, f64);
}

/// Damage-driven trap creation with two saturating channels:
///
/// `R = phi_0 [ (1 - n / n_amax) eta_a f_a + (1 - n / n_bmax) eta_b f_b ]`
#[derive(Clone, Debug, PartialEq)]
pub struct DamageCreation {
    /// Incident flux.
    pub phi_0: ExpressionId,
    /// Saturation density of channel a.
    pub n_amax: f64,
    /// Saturation density of channel b.
    pub n_bmax: f64,
    /// Creation efficiency of channel a.
    pub eta_a: f64,
    /// Creation efficiency of channel b.
    pub eta_b: f64,
    /// Spatial distribution of channel a.
    pub f_a: ExpressionId,
    /// Spatial distribution of channel b.
    pub f_b: ExpressionId,
}

impl TrapDensityLaw for DamageCreation {
    fn rate(&self, n: f64, inputs: &TrapInputs, clock: &ExpressionClock) -> (f64, f64) {
        let p = &inputs.point;
        let phi = clock.evaluate_at(self.phi_0, p, inputs.time);
        let a = self.eta_a * clock.evaluate_at(self.f_a, p, inputs.time);
        let b = self.eta_b * clock.evaluate_at(self.f_b, p, inputs.time);
        let rate = phi * ((1.0 - n / self.n_amax) * a + (1.0 - n / self.n_bmax) * b);
        let derivative = -phi * (a / self.n_amax + b / self.n_bmax);
        (rate, derivative)
    }
}

/// Advances one extrinsic density field.
pub struct ExtrinsicTrapSubproblem {
    name: String,
    density: FieldId,
    concentration: FieldId,
    temperature: FieldId,
    trap_component: usize,
    components: usize,
    law: Box<dyn TrapDensityLaw>,
}

impl ExtrinsicTrapSubproblem {
    /// Stage for the density of the trap at `trap_component` of the
    /// concentration vector.
    pub fn new(
        name: impl Into<String>,
        density: FieldId,
        concentration: FieldId,
        temperature: FieldId,
        trap_component: usize,
        components: usize,
        law: Box<dyn TrapDensityLaw>,
    ) -> Self {
        Self {
            name: name.into(),
            density,
            concentration,
            temperature,
            trap_component,
            components,
            law,
        }
    }

    /// The density field advanced.
    pub fn density(&self) -> FieldId {
        self.density
    }
}

impl Subproblem for ExtrinsicTrapSubproblem {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        [self.concentration, self.temperature].into_iter().collect()
    }

    fn reads_previous(&self) -> FieldSet {
        [self.density].into_iter().collect()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.density, WriteMode::Incremental)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let step = ctx.step();
        let dt = step.dt.ok_or_else(|| SolveError::InvalidState {
            reason: format!("{} needs a step size", self.name),
        })?;
        let mesh = ctx.mesh();
        let clock = ctx.expressions();
        let props = ctx.properties();
        let cells = mesh.cell_count();

        let concentration = ctx.read(self.concentration)?;
        let temperature = ctx.read(self.temperature)?;
        let previous = ctx.read_previous(self.density)?;
        for (field, data, expected) in [
            (self.concentration, concentration, cells * self.components),
            (self.temperature, temperature, cells),
            (self.density, previous, cells),
        ] {
            if data.len() != expected {
                return Err(SolveError::SizeMismatch {
                    field,
                    expected,
                    actual: data.len(),
                });
            }
        }

        let out = ctx.write(self.density)?;
        let mut worst = SolveReport::default();
        for c in 0..cells {
            let base = c * self.components;
            let inputs = TrapInputs {
                mobile: props.solubility_or_one(c) * concentration[base],
                trapped: concentration[base + self.trap_component],
                temperature: temperature[c],
                point: mesh.centroid(c),
                time: step.time,
            };
            let n_prev = previous[c];
            let mut n = n_prev;
            let mut converged = false;
            for iteration in 1..=MAX_ITERATIONS {
                let (rate, d_rate) = self.law.rate(n, &inputs, clock);
                let g = (n - n_prev) / dt - rate;
                let dg = 1.0 / dt - d_rate;
                let delta = -g / dg;
                if !delta.is_finite() {
                    return Err(ConvergenceError {
                        subproblem: self.name.clone(),
                        iterations: iteration,
                        residual: g.abs(),
                        reason: ConvergenceFailure::NonFinite,
                    }
                    .into());
                }
                n += delta;
                if delta.abs() <= TOLERANCE * n.abs().max(1.0) {
                    if iteration > worst.iterations {
                        worst = SolveReport {
                            iterations: iteration,
                            residual: delta.abs(),
                        };
                    }
                    converged = true;
                    break;
                }
            }
            if !converged {
                return Err(ConvergenceError {
                    subproblem: self.name.clone(),
                    iterations: MAX_ITERATIONS,
                    residual: f64::NAN,
                    reason: ConvergenceFailure::MaxIterations,
                }
                .into());
            }
            out[c] = n;
        }
        Ok(worst)
    }
}
