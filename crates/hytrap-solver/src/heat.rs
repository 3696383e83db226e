//! Temperature stages.
//!
//! Temperature is either prescribed by an expression of space and time,
//! or solved from the heat equation
//! `rho cp dT/dt = div(k grad T) + Q` with temperature-dependent
//! properties.

use hytrap_core::{FieldId, FieldSet, SolveError};
use hytrap_expr::{ExpressionClock, ExpressionId};
use hytrap_materials::MaterialTable;
use hytrap_mesh::Mesh;
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::boundary::HeatBc;
use crate::context::SolveContext;
use crate::newton::{NewtonSettings, NewtonSolver, NonlinearProblem};
use crate::subproblem::{SolveReport, Subproblem, WriteMode};
use crate::transport::harmonic_mean;

/// How temperature is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeatMode {
    /// Evaluated from an expression at cell centroids.
    Prescribed(ExpressionId),
    /// Transient heat equation, one backward-Euler step per call.
    TransientPde,
    /// Steady heat equation, solved once before time stepping.
    StationaryPde,
}

/// Newton criteria for the heat equation. Temperatures are O(100) K so
/// the absolute tolerance is loose.
const HEAT_NEWTON: NewtonSettings = NewtonSettings {
    absolute_tolerance: 1e-3,
    relative_tolerance: 1e-10,
    maximum_iterations: 50,
    relaxation_parameter: 1.0,
};

// ── PrescribedTemperature ───────────────────────────────────────

/// Writes `T(x, t)` at every cell centroid.
pub struct PrescribedTemperature {
    temperature: FieldId,
    value: ExpressionId,
}

impl PrescribedTemperature {
    /// Create the stage writing `temperature` from `value`.
    pub fn new(temperature: FieldId, value: ExpressionId) -> Self {
        Self { temperature, value }
    }
}

impl Subproblem for PrescribedTemperature {
    fn name(&self) -> &str {
        "temperature"
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.temperature, WriteMode::Full)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let mesh = ctx.mesh();
        let clock = ctx.expressions();
        let out = ctx.write(self.temperature)?;
        if out.len() != mesh.cell_count() {
            return Err(SolveError::SizeMismatch {
                field: self.temperature,
                expected: mesh.cell_count(),
                actual: out.len(),
            });
        }
        for (cell, value) in out.iter_mut().enumerate() {
            *value = clock.evaluate(self.value, &mesh.centroid(cell));
        }
        Ok(SolveReport::default())
    }
}

// ── HeatSubproblem ──────────────────────────────────────────────

/// Heat equation solved for the temperature field.
pub struct HeatSubproblem {
    temperature: FieldId,
    boundary_conditions: Vec<HeatBc>,
    source: Option<ExpressionId>,
    transient: bool,
    solver: NewtonSolver,
}

impl HeatSubproblem {
    /// Create a heat stage. `transient = false` drops the storage term.
    pub fn new(temperature: FieldId, boundary_conditions: Vec<HeatBc>, transient: bool) -> Self {
        Self {
            temperature,
            boundary_conditions,
            source: None,
            transient,
            solver: NewtonSolver::new(HEAT_NEWTON),
        }
    }

    /// Add a volumetric heat source, W/m^3.
    pub fn with_source(mut self, source: ExpressionId) -> Self {
        self.source = Some(source);
        self
    }

    /// Boundary conditions, for heat flux post-processing.
    pub fn boundary_conditions(&self) -> &[HeatBc] {
        &self.boundary_conditions
    }

    /// Whether the storage term is included.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Solve outside a pipeline, starting from and overwriting
    /// `temperature`. Used for the steady solve before time stepping.
    pub fn solve_field(
        &self,
        temperature: &mut [f64],
        mesh: &dyn Mesh,
        materials: &MaterialTable,
        clock: &ExpressionClock,
    ) -> Result<SolveReport, SolveError> {
        self.solve_inner(temperature, None, mesh, materials, clock)
    }

    fn solve_inner(
        &self,
        temperature: &mut [f64],
        previous: Option<(&[f64], f64)>,
        mesh: &dyn Mesh,
        materials: &MaterialTable,
        clock: &ExpressionClock,
    ) -> Result<SolveReport, SolveError> {
        let cells = mesh.cell_count();
        if temperature.len() != cells {
            return Err(SolveError::SizeMismatch {
                field: self.temperature,
                expected: cells,
                actual: temperature.len(),
            });
        }
        if !materials.has_thermal_properties() {
            return Err(SolveError::InvalidState {
                reason: "heat equation needs thermal_cond, heat_capacity and rho on every material"
                    .into(),
            });
        }

        let source = match self.source {
            Some(id) => (0..cells)
                .map(|c| mesh.volume(c) * clock.evaluate(id, &mesh.centroid(c)))
                .collect(),
            None => vec![0.0; cells],
        };
        let problem = HeatProblem {
            mesh,
            materials,
            clock,
            previous,
            source,
            bcs: &self.boundary_conditions,
        };

        let mut x = DVector::from_column_slice(temperature);
        let report = self.solver.solve("heat", &problem, &mut x)?;
        debug!(
            "heat: {} iterations, residual {:e}",
            report.iterations, report.residual
        );
        temperature.copy_from_slice(x.as_slice());
        Ok(SolveReport {
            iterations: report.iterations,
            residual: report.residual,
        })
    }
}

impl Subproblem for HeatSubproblem {
    fn name(&self) -> &str {
        "heat"
    }

    fn reads(&self) -> FieldSet {
        [self.temperature].into_iter().collect()
    }

    fn reads_previous(&self) -> FieldSet {
        if self.transient {
            [self.temperature].into_iter().collect()
        } else {
            FieldSet::empty()
        }
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.temperature, WriteMode::Incremental)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let mesh = ctx.mesh();
        let materials = ctx.materials();
        let clock = ctx.expressions();
        let previous = if self.transient {
            let dt = ctx.step().dt.ok_or_else(|| SolveError::InvalidState {
                reason: "transient heat solve without a step size".into(),
            })?;
            Some((ctx.read_previous(self.temperature)?, dt))
        } else {
            None
        };
        if let Some((prev, _)) = previous {
            if prev.len() != mesh.cell_count() {
                return Err(SolveError::SizeMismatch {
                    field: self.temperature,
                    expected: mesh.cell_count(),
                    actual: prev.len(),
                });
            }
        }
        let field = self.temperature;
        let temperature = ctx.write(field)?;
        self.solve_inner(temperature, previous, mesh, materials, clock)
    }
}

struct HeatProblem<'p> {
    mesh: &'p dyn Mesh,
    materials: &'p MaterialTable,
    clock: &'p ExpressionClock,
    previous: Option<(&'p [f64], f64)>,
    source: Vec<f64>,
    bcs: &'p [HeatBc],
}

impl NonlinearProblem for HeatProblem<'_> {
    fn size(&self) -> usize {
        self.mesh.cell_count()
    }

    fn assemble(&self, x: &DVector<f64>, r: &mut DVector<f64>, j: &mut DMatrix<f64>) {
        let cells = self.mesh.cell_count();
        let conductivity: Vec<(f64, f64)> = (0..cells)
            .map(|c| self.materials.thermal_conductivity_at(c, x[c]))
            .collect();

        for c in 0..cells {
            r[c] -= self.source[c];
            if let Some((previous, dt)) = self.previous {
                let v = self.mesh.volume(c);
                let (rc, drc) = self.materials.volumetric_heat_capacity_at(c, x[c]);
                let jump = x[c] - previous[c];
                r[c] += v * rc * jump / dt;
                j[(c, c)] += v * (rc + drc * jump) / dt;
            }
        }

        for face in self.mesh.interior_faces() {
            let (a, b) = face.cells;
            let ((ka, dka), (kb, dkb)) = (conductivity[a], conductivity[b]);
            let g = face.area / face.distance;
            let k_f = harmonic_mean(ka, kb);
            // d(2ab/(a+b))/da = 2b^2/(a+b)^2
            let (dk_a, dk_b) = if ka + kb == 0.0 {
                (0.0, 0.0)
            } else {
                let s2 = (ka + kb) * (ka + kb);
                (2.0 * kb * kb / s2 * dka, 2.0 * ka * ka / s2 * dkb)
            };
            let jump = x[a] - x[b];
            let q = g * k_f * jump;
            r[a] += q;
            r[b] -= q;
            let dq_a = g * (k_f + dk_a * jump);
            let dq_b = g * (-k_f + dk_b * jump);
            j[(a, a)] += dq_a;
            j[(a, b)] += dq_b;
            j[(b, a)] -= dq_a;
            j[(b, b)] -= dq_b;
        }

        for face in self.mesh.boundary_faces() {
            let c = face.cell;
            let (k, dk) = conductivity[c];
            for bc in self.bcs.iter().filter(|bc| bc.applies_to(face.surface)) {
                let (q, dq) = bc.outflow(face, x[c], k, dk, self.clock);
                r[c] += q;
                j[(c, c)] += dq;
            }
        }
    }
}
