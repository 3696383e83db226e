//! Coupled hydrogen transport and trapping.
//!
//! Cell-centred finite volumes with backward Euler in time. Per cell the
//! unknowns are the mobile concentration `u` (divided by solubility
//! under chemical potential) followed by one trapped concentration per
//! trap. Residual and Jacobian are rebuilt from the current iterate and
//! the current property snapshot at every Newton iteration.

use hytrap_core::{FieldId, FieldSet, SolveError};
use hytrap_expr::{ExpressionClock, ExpressionId};
use hytrap_materials::K_B;
use hytrap_mesh::Mesh;
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::boundary::{FaceState, TransportBc};
use crate::context::SolveContext;
use crate::layout::FieldLayout;
use crate::newton::{NewtonSettings, NewtonSolver, NonlinearProblem};
use crate::subproblem::{SolveReport, Subproblem, WriteMode};
use crate::trap::{TrapKind, TrapSpec};

/// How the transport system is advanced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStrategy {
    /// A single steady-state solve; time derivatives are dropped.
    Once,
    /// One backward-Euler step per call; requires a step size.
    Iterative,
}

/// The transport stage.
pub struct TransportSubproblem {
    layout: FieldLayout,
    traps: Vec<TrapSpec>,
    boundary_conditions: Vec<TransportBc>,
    source: Option<ExpressionId>,
    soret: bool,
    strategy: SolveStrategy,
    solver: NewtonSolver,
}

impl TransportSubproblem {
    /// Create the stage. `traps` must be in layout order.
    pub fn new(
        layout: FieldLayout,
        traps: Vec<TrapSpec>,
        boundary_conditions: Vec<TransportBc>,
        strategy: SolveStrategy,
        settings: NewtonSettings,
    ) -> Self {
        Self {
            layout,
            traps,
            boundary_conditions,
            source: None,
            soret: false,
            strategy,
            solver: NewtonSolver::new(settings),
        }
    }

    /// Add a volumetric source of mobile particles.
    pub fn with_source(mut self, source: ExpressionId) -> Self {
        self.source = Some(source);
        self
    }

    /// Enable the Soret (thermo-diffusion) term.
    pub fn with_soret(mut self, enabled: bool) -> Self {
        self.soret = enabled;
        self
    }

    /// Boundary conditions, for flux post-processing.
    pub fn boundary_conditions(&self) -> &[TransportBc] {
        &self.boundary_conditions
    }

    /// Trap definitions in layout order.
    pub fn traps(&self) -> &[TrapSpec] {
        &self.traps
    }
}

fn check_len(field: FieldId, data: &[f64], expected: usize) -> Result<(), SolveError> {
    if data.len() != expected {
        return Err(SolveError::SizeMismatch {
            field,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// `2ab / (a + b)`, zero when both are zero.
pub(crate) fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

impl Subproblem for TransportSubproblem {
    fn name(&self) -> &str {
        "transport"
    }

    fn reads(&self) -> FieldSet {
        [self.layout.temperature, self.layout.concentration]
            .into_iter()
            .chain(self.layout.extrinsic.iter().copied())
            .collect()
    }

    fn reads_previous(&self) -> FieldSet {
        [self.layout.temperature, self.layout.concentration]
            .into_iter()
            .collect()
    }

    fn writes(&self) -> Vec<(FieldId, WriteMode)> {
        vec![(self.layout.concentration, WriteMode::Incremental)]
    }

    fn solve(&self, ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
        let mesh = ctx.mesh();
        let clock = ctx.expressions();
        let props = ctx.properties();
        let materials = ctx.materials();
        let step = ctx.step();
        let cells = mesh.cell_count();
        let m = self.layout.components();

        let dt = match self.strategy {
            SolveStrategy::Once => None,
            SolveStrategy::Iterative => Some(step.dt.ok_or_else(|| SolveError::InvalidState {
                reason: "iterative transport solve without a step size".into(),
            })?),
        };
        if props.cell_count() != cells {
            return Err(SolveError::InvalidState {
                reason: format!(
                    "property snapshot covers {} cells, mesh has {cells}",
                    props.cell_count()
                ),
            });
        }

        let temperature = ctx.read(self.layout.temperature)?;
        check_len(self.layout.temperature, temperature, cells)?;
        let previous_temperature = ctx.read_previous(self.layout.temperature)?;
        check_len(self.layout.temperature, previous_temperature, cells)?;
        let previous = ctx.read_previous(self.layout.concentration)?;
        check_len(self.layout.concentration, previous, cells * m)?;

        let previous_solubility: Vec<f64> = (0..cells)
            .map(|c| {
                materials
                    .solubility_at(c, previous_temperature[c])
                    .unwrap_or(1.0)
            })
            .collect();

        let mut densities = Vec::with_capacity(self.traps.len());
        for trap in &self.traps {
            let n = match trap.kind {
                TrapKind::Intrinsic { density } => (0..cells)
                    .map(|c| clock.evaluate(density, &mesh.centroid(c)))
                    .collect(),
                TrapKind::Extrinsic { field } => {
                    let data = ctx.read(field)?;
                    check_len(field, data, cells)?;
                    data.to_vec()
                }
            };
            densities.push(n);
        }
        let rates: Vec<TrapRates> = self
            .traps
            .iter()
            .zip(densities)
            .map(|(trap, density)| TrapRates {
                active: (0..cells)
                    .map(|c| trap.is_active_in(mesh.volume_marker(c)))
                    .collect(),
                trapping: temperature.iter().map(|&t| trap.trapping_rate(t)).collect(),
                detrapping: temperature
                    .iter()
                    .map(|&t| trap.detrapping_rate(t))
                    .collect(),
                density,
            })
            .collect();

        let source = match self.source {
            Some(id) => (0..cells)
                .map(|c| mesh.volume(c) * clock.evaluate(id, &mesh.centroid(c)))
                .collect(),
            None => vec![0.0; cells],
        };

        let boundary = mesh
            .boundary_faces()
            .iter()
            .enumerate()
            .flat_map(|(f, face)| {
                self.boundary_conditions
                    .iter()
                    .enumerate()
                    .filter(move |(_, bc)| bc.applies_to(face.surface))
                    .map(move |(b, _)| (f, b))
            })
            .collect();

        let problem = TransportProblem {
            mesh,
            clock,
            components: m,
            dt,
            temperature,
            previous,
            solubility: props.solubility.as_deref(),
            previous_solubility,
            diffusivity: &props.diffusivity,
            heat_of_transport: if self.soret {
                props.heat_of_transport.as_deref()
            } else {
                None
            },
            rates,
            source,
            bcs: &self.boundary_conditions,
            boundary,
        };

        let field = self.layout.concentration;
        let guess = ctx.write(field)?;
        check_len(field, guess, cells * m)?;
        let mut x = DVector::from_column_slice(guess);

        let report = self.solver.solve(self.name(), &problem, &mut x)?;
        match self.strategy {
            SolveStrategy::Once => debug!(
                "transport: steady state in {} iterations, residual {:e}",
                report.iterations, report.residual
            ),
            SolveStrategy::Iterative => debug!(
                "transport: step {} (t = {}) in {} iterations, residual {:e}",
                step.index, step.time, report.iterations, report.residual
            ),
        }

        ctx.write(field)?.copy_from_slice(x.as_slice());
        Ok(SolveReport {
            iterations: report.iterations,
            residual: report.residual,
        })
    }
}

struct TrapRates {
    active: Vec<bool>,
    trapping: Vec<f64>,
    detrapping: Vec<f64>,
    density: Vec<f64>,
}

struct TransportProblem<'p> {
    mesh: &'p dyn Mesh,
    clock: &'p ExpressionClock,
    components: usize,
    dt: Option<f64>,
    temperature: &'p [f64],
    previous: &'p [f64],
    solubility: Option<&'p [f64]>,
    previous_solubility: Vec<f64>,
    diffusivity: &'p [f64],
    heat_of_transport: Option<&'p [f64]>,
    rates: Vec<TrapRates>,
    /// Volume-integrated source per cell.
    source: Vec<f64>,
    bcs: &'p [TransportBc],
    /// `(boundary face index, condition index)` pairs.
    boundary: Vec<(usize, usize)>,
}

impl TransportProblem<'_> {
    fn s(&self, cell: usize) -> f64 {
        self.solubility.map_or(1.0, |s| s[cell])
    }
}

impl NonlinearProblem for TransportProblem<'_> {
    fn size(&self) -> usize {
        self.mesh.cell_count() * self.components
    }

    fn assemble(&self, x: &DVector<f64>, r: &mut DVector<f64>, j: &mut DMatrix<f64>) {
        let m = self.components;

        for c in 0..self.mesh.cell_count() {
            let v = self.mesh.volume(c);
            let i0 = c * m;
            let s_c = self.s(c);
            let mobile = s_c * x[i0];

            if let Some(dt) = self.dt {
                let mobile_prev = self.previous_solubility[c] * self.previous[i0];
                r[i0] += v * (mobile - mobile_prev) / dt;
                j[(i0, i0)] += v * s_c / dt;
            }
            r[i0] -= self.source[c];

            for (k, rates) in self.rates.iter().enumerate() {
                let ik = i0 + 1 + k;
                let trapped = x[ik];
                let trapped_prev = self.previous[ik];
                if !rates.active[c] {
                    r[ik] += v * (trapped - trapped_prev);
                    j[(ik, ik)] += v;
                    continue;
                }

                let (kt, pt, n) = (rates.trapping[c], rates.detrapping[c], rates.density[c]);
                r[ik] -= v * (kt * mobile * (n - trapped) - pt * trapped);
                j[(ik, ik)] += v * (kt * mobile + pt);
                j[(ik, i0)] -= v * kt * s_c * (n - trapped);

                if let Some(dt) = self.dt {
                    let rate = v * (trapped - trapped_prev) / dt;
                    r[ik] += rate;
                    j[(ik, ik)] += v / dt;
                    r[i0] += rate;
                    j[(i0, ik)] += v / dt;
                }
            }
        }

        for face in self.mesh.interior_faces() {
            let (a, b) = face.cells;
            let (ia, ib) = (a * m, b * m);
            let (s_a, s_b) = (self.s(a), self.s(b));
            let permeability =
                harmonic_mean(self.diffusivity[a] * s_a, self.diffusivity[b] * s_b);
            let g = face.area * permeability / face.distance;
            let q = g * (x[ia] - x[ib]);
            r[ia] += q;
            r[ib] -= q;
            j[(ia, ia)] += g;
            j[(ia, ib)] -= g;
            j[(ib, ib)] += g;
            j[(ib, ia)] -= g;

            if let Some(h) = self.heat_of_transport {
                let (t_a, t_b) = (self.temperature[a], self.temperature[b]);
                let t_f = 0.5 * (t_a + t_b);
                let h_f = 0.5 * (h[a] + h[b]);
                let d_f = harmonic_mean(self.diffusivity[a], self.diffusivity[b]);
                let coef =
                    face.area * d_f * h_f / (K_B * t_f * t_f) * (t_a - t_b) / face.distance;
                let c_f = 0.5 * (s_a * x[ia] + s_b * x[ib]);
                r[ia] += coef * c_f;
                r[ib] -= coef * c_f;
                j[(ia, ia)] += 0.5 * coef * s_a;
                j[(ia, ib)] += 0.5 * coef * s_b;
                j[(ib, ia)] -= 0.5 * coef * s_a;
                j[(ib, ib)] -= 0.5 * coef * s_b;
            }
        }

        let faces = self.mesh.boundary_faces();
        for &(f, b) in &self.boundary {
            let face = &faces[f];
            let c = face.cell;
            let i0 = c * m;
            let state = FaceState {
                u: x[i0],
                solubility: self.s(c),
                diffusivity: self.diffusivity[c],
                temperature: self.temperature[c],
            };
            let (q, dq) = self.bcs[b].outflow(face, &state, self.clock);
            r[i0] += q;
            j[(i0, i0)] += dq;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hytrap_core::StepIndex;
    use hytrap_expr::Expression;
    use hytrap_materials::{Enthalpy, Material, MaterialTable};
    use hytrap_mesh::IntervalMesh;
    use hytrap_test_utils::{MockFieldReader, MockFieldWriter};
    use smallvec::SmallVec;

    use crate::boundary::TransportBcKind;
    use crate::context::StepInfo;

    struct Fixture {
        mesh: IntervalMesh,
        table: MaterialTable,
        clock: ExpressionClock,
        reader: MockFieldReader,
        writer: MockFieldWriter,
    }

    impl Fixture {
        fn new(cells: usize, layout: &FieldLayout, material: Material) -> Self {
            let mesh = IntervalMesh::uniform(1.0, cells).unwrap();
            let table = MaterialTable::new(vec![material], &mesh).unwrap();
            let mut reader = MockFieldReader::new();
            reader.set_field(layout.temperature, vec![300.0; cells]);
            reader.set_field(layout.concentration, vec![0.0; cells * layout.components()]);
            let mut writer = MockFieldWriter::new();
            writer.add_field(layout.concentration, cells * layout.components());
            Self {
                mesh,
                table,
                clock: ExpressionClock::new(),
                reader,
                writer,
            }
        }

        fn run(
            &mut self,
            stage: &TransportSubproblem,
            step: StepInfo,
        ) -> Result<SolveReport, SolveError> {
            let temperature = self.reader.get_field(FieldId(0)).unwrap().to_vec();
            let props = self.table.refresh(&temperature).unwrap();
            let mut ctx = SolveContext::new(
                &self.reader,
                &self.reader,
                &mut self.writer,
                &self.mesh,
                &props,
                &self.table,
                &self.clock,
                step,
            );
            stage.solve(&mut ctx)
        }
    }

    fn dirichlet(clock: &mut ExpressionClock, surface: u32, value: f64) -> TransportBc {
        let value = clock.register(format!("dc{surface}"), Expression::constant(value));
        TransportBc {
            surfaces: SmallVec::from_slice(&[surface]),
            kind: TransportBcKind::Dirichlet { value },
        }
    }

    #[test]
    fn steady_diffusion_is_linear_between_dirichlet_values() {
        let layout = FieldLayout::new(0, 0);
        let mut fx = Fixture::new(10, &layout, Material::new(1, 1.0, 0.0));
        let bcs = vec![dirichlet(&mut fx.clock, 1, 1.0), dirichlet(&mut fx.clock, 2, 0.0)];
        let stage = TransportSubproblem::new(
            layout.clone(),
            vec![],
            bcs,
            SolveStrategy::Once,
            NewtonSettings::default(),
        );
        fx.run(&stage, StepInfo::stationary()).unwrap();

        let c = fx.writer.get_field(layout.concentration).unwrap();
        for (i, &value) in c.iter().enumerate() {
            let x = (i as f64 + 0.5) / 10.0;
            assert_relative_eq!(value, 1.0 - x, epsilon = 1e-9);
        }
    }

    #[test]
    fn trapped_concentration_reaches_equilibrium() {
        // Steady state with uniform mobile c = 1: k c (n - ct) = p ct,
        // so ct = k c n / (k c + p).
        let layout = FieldLayout::new(1, 0);
        let mut fx = Fixture::new(4, &layout, Material::new(1, 1.0, 0.0));
        let density = fx.clock.register("n", Expression::constant(10.0));
        let bcs = vec![dirichlet(&mut fx.clock, 1, 1.0), dirichlet(&mut fx.clock, 2, 1.0)];
        let trap = TrapSpec {
            k_0: 2.0,
            e_k: 0.0,
            p_0: 3.0,
            e_p: 0.0,
            materials: SmallVec::from_slice(&[1]),
            kind: TrapKind::Intrinsic { density },
        };
        let stage = TransportSubproblem::new(
            layout.clone(),
            vec![trap],
            bcs,
            SolveStrategy::Once,
            NewtonSettings::default(),
        );
        fx.run(&stage, StepInfo::stationary()).unwrap();

        let c = fx.writer.get_field(layout.concentration).unwrap();
        for cell in 0..4 {
            assert_relative_eq!(c[layout.index(cell, 0)], 1.0, epsilon = 1e-9);
            assert_relative_eq!(c[layout.index(cell, 1)], 4.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn transient_step_conserves_particles_without_boundaries() {
        let layout = FieldLayout::new(0, 0);
        let mut fx = Fixture::new(5, &layout, Material::new(1, 0.1, 0.0));
        fx.reader
            .set_field(layout.concentration, vec![5.0, 0.0, 0.0, 0.0, 0.0]);
        fx.writer.set_field(layout.concentration, vec![5.0, 0.0, 0.0, 0.0, 0.0]);
        let stage = TransportSubproblem::new(
            layout.clone(),
            vec![],
            vec![],
            SolveStrategy::Iterative,
            NewtonSettings::default(),
        );
        fx.run(&stage, StepInfo::transient(StepIndex(1), 0.1, 0.1))
            .unwrap();

        let c = fx.writer.get_field(layout.concentration).unwrap();
        let total: f64 = c.iter().map(|v| v * 0.2).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(c[0] < 5.0 && c[1] > 0.0);
    }

    #[test]
    fn iterative_strategy_requires_step_size() {
        let layout = FieldLayout::new(0, 0);
        let mut fx = Fixture::new(2, &layout, Material::new(1, 1.0, 0.0));
        let stage = TransportSubproblem::new(
            layout,
            vec![],
            vec![],
            SolveStrategy::Iterative,
            NewtonSettings::default(),
        );
        assert!(matches!(
            fx.run(&stage, StepInfo::stationary()),
            Err(SolveError::InvalidState { .. })
        ));
    }

    #[test]
    fn extrinsic_density_read_from_field() {
        let layout = FieldLayout::new(1, 1);
        let mut fx = Fixture::new(3, &layout, Material::new(1, 1.0, 0.0));
        fx.reader.set_field(layout.extrinsic[0], vec![6.0; 3]);
        let bcs = vec![dirichlet(&mut fx.clock, 1, 2.0), dirichlet(&mut fx.clock, 2, 2.0)];
        let trap = TrapSpec {
            k_0: 1.0,
            e_k: 0.0,
            p_0: 1.0,
            e_p: 0.0,
            materials: SmallVec::from_slice(&[1]),
            kind: TrapKind::Extrinsic {
                field: layout.extrinsic[0],
            },
        };
        let stage = TransportSubproblem::new(
            layout.clone(),
            vec![trap],
            bcs,
            SolveStrategy::Once,
            NewtonSettings::default(),
        );
        assert!(stage.reads().contains(layout.extrinsic[0]));
        fx.run(&stage, StepInfo::stationary()).unwrap();
        // ct = 1 * 2 * 6 / (2 + 1) = 4
        let c = fx.writer.get_field(layout.concentration).unwrap();
        assert_relative_eq!(c[layout.index(1, 1)], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn chemical_potential_keeps_unknown_continuous() {
        // Two materials with S = 1 and S = 2 and u = 1 imposed on both
        // ends: u stays uniform and the physical concentration jumps.
        let layout = FieldLayout::new(0, 0);
        let mut mesh = IntervalMesh::uniform(1.0, 4).unwrap();
        mesh.mark_volumes(|p| if p[0] < 0.5 { 1 } else { 2 });
        let table = MaterialTable::new(
            vec![
                Material::new(1, 1.0, 0.0).with_solubility(1.0, 0.0),
                Material::new(2, 1.0, 0.0).with_solubility(2.0, 0.0),
            ],
            &mesh,
        )
        .unwrap();
        let mut clock = ExpressionClock::new();
        let bcs = vec![dirichlet(&mut clock, 1, 1.0), dirichlet(&mut clock, 2, 2.0)];
        let stage = TransportSubproblem::new(
            layout.clone(),
            vec![],
            bcs,
            SolveStrategy::Once,
            NewtonSettings::default(),
        );

        let mut reader = MockFieldReader::new();
        reader.set_field(layout.temperature, vec![300.0; 4]);
        reader.set_field(layout.concentration, vec![0.0; 4]);
        let mut writer = MockFieldWriter::new();
        writer.add_field(layout.concentration, 4);
        let props = table.refresh(&[300.0; 4]).unwrap();
        let mut ctx = SolveContext::new(
            &reader,
            &reader,
            &mut writer,
            &mesh,
            &props,
            &table,
            &clock,
            StepInfo::stationary(),
        );
        stage.solve(&mut ctx).unwrap();

        let u = writer.get_field(layout.concentration).unwrap();
        for &value in u {
            assert_relative_eq!(value, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn soret_equilibrium_follows_heat_of_transport() {
        // Zero net flux: d ln c = -H / (k_B T^2) dT, so
        // c_end / c_0 = exp(H / k_B (1 / T_end - 1 / T_0)).
        let cells = 200;
        let h = 0.05;
        let layout = FieldLayout::new(0, 0);
        let mut material = Material::new(1, 1.0, 0.0);
        material.heat_of_transport = Some(Enthalpy {
            free_enthalpy: h,
            entropy: 0.0,
        });
        let mut fx = Fixture::new(cells, &layout, material);
        let temperature: Vec<f64> = (0..cells)
            .map(|i| 300.0 + 300.0 * (i as f64 + 0.5) / cells as f64)
            .collect();
        fx.reader.set_field(layout.temperature, temperature.clone());
        // Only the cold end is pinned; the hot end is closed.
        let bcs = vec![dirichlet(&mut fx.clock, 1, 1.0)];
        let stage = TransportSubproblem::new(
            layout.clone(),
            vec![],
            bcs,
            SolveStrategy::Once,
            NewtonSettings::default(),
        )
        .with_soret(true);
        fx.run(&stage, StepInfo::stationary()).unwrap();

        let c = fx.writer.get_field(layout.concentration).unwrap();
        let (t_0, t_end) = (temperature[0], temperature[cells - 1]);
        let expected = (h / K_B * (1.0 / t_end - 1.0 / t_0)).exp();
        assert_relative_eq!(c[cells - 1] / c[0], expected, max_relative = 1e-4);
        assert!(c.windows(2).all(|w| w[1] < w[0]));

        // Without the term the closed slab is uniform.
        let plain = TransportSubproblem::new(
            layout.clone(),
            vec![],
            vec![dirichlet(&mut fx.clock, 1, 1.0)],
            SolveStrategy::Once,
            NewtonSettings::default(),
        );
        fx.run(&plain, StepInfo::stationary()).unwrap();
        let c = fx.writer.get_field(layout.concentration).unwrap();
        for &value in c {
            assert_relative_eq!(value, 1.0, epsilon = 1e-9);
        }
    }
}
