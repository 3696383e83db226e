//! Resolve [`Parameters`] into a runnable [`SimulationConfig`].
//!
//! Every mode string is matched here, once, into a tagged variant
//! ([`SolveMode`], [`HeatMode`], [`TrapKind`]). Missing keys and unknown
//! values are reported as [`ConfigurationError`] before anything is
//! solved.

use hytrap_core::{Point, SolveError};
use hytrap_expr::{Expression, ExpressionClock};
use hytrap_materials::{Material, MaterialTable};
use hytrap_mesh::{IntervalMesh, Mesh, RectangleMesh, Refinement};
use hytrap_solver::{
    DamageCreation, ExtrinsicTrapSubproblem, FieldLayout, HeatBc, HeatBcKind, HeatMode,
    HeatSubproblem, PrescribedTemperature, SolveReport, SolveStrategy, Subproblem, TransportBc,
    TransportBcKind, TransportSubproblem, TrapKind, TrapSpec,
};
use log::debug;

use crate::config::{ConfigurationError, SimulationConfig, SolveMode};
use crate::output::{ErrorNorm, ErrorSpec, SolutionField};
use crate::parameters::{
    BoundaryConditionParameters, DerivedQuantitiesParameters, MeshParameters, Parameters,
    SolvingParameters, TrapParameters,
};
use crate::postprocess::{DerivedQuantities, PostProcessor};
use crate::snapshot::{CsvSnapshotWriter, FieldExport};

/// Newton guess for a steady heat solve without `initial_condition`, K.
const DEFAULT_TEMPERATURE_GUESS: f64 = 300.0;

/// A resolved simulation plus the work that happens around the loop.
pub struct Setup {
    /// Engine configuration.
    pub config: SimulationConfig,
    /// How temperature is obtained.
    pub heat_mode: HeatMode,
    /// Steady heat solve to run once before stepping.
    pub heat_presolve: Option<HeatSubproblem>,
    /// Error norms evaluated at the final time.
    pub errors: Vec<ErrorSpec>,
    /// Where to write the derived-quantity table.
    pub derived_output: Option<DerivedQuantitiesParameters>,
    initial_state_resolved: bool,
}

impl Setup {
    /// Finish the initial state: run the steady heat solve, if any, then
    /// convert the initial mobile concentration to the solved variable
    /// `c / S(T0)` under chemical potential.
    ///
    /// Idempotent.
    pub fn resolve_initial_state(&mut self) -> Result<Option<SolveReport>, SolveError> {
        if self.initial_state_resolved {
            return Ok(None);
        }
        let config = &mut self.config;
        let layout = &config.layout;
        let (temperature, rest) = split_initial(&mut config.initial_values, layout)?;

        let report = match self.heat_presolve.take() {
            Some(heat) => {
                let report = heat.solve_field(
                    temperature,
                    config.mesh.as_ref(),
                    &config.materials,
                    &config.expressions,
                )?;
                debug!(
                    "steady temperature: {} iterations, residual {:e}",
                    report.iterations, report.residual
                );
                Some(report)
            }
            None => None,
        };

        if config.materials.chemical_potential() {
            let m = layout.components();
            for (cell, &t) in temperature.iter().enumerate() {
                if let Some(s) = config.materials.solubility_at(cell, t) {
                    rest[cell * m] /= s;
                }
            }
        }
        self.initial_state_resolved = true;
        Ok(report)
    }
}

/// Borrow the temperature and concentration initial buffers together.
fn split_initial<'a>(
    values: &'a mut [Vec<f64>],
    layout: &FieldLayout,
) -> Result<(&'a mut [f64], &'a mut [f64]), SolveError> {
    let t = layout.temperature.0 as usize;
    let c = layout.concentration.0 as usize;
    if t >= c || c >= values.len() {
        return Err(SolveError::InvalidState {
            reason: "temperature must precede concentration in the layout".into(),
        });
    }
    let (head, tail) = values.split_at_mut(c);
    Ok((head[t].as_mut_slice(), tail[0].as_mut_slice()))
}

// ── build ──────────────────────────────────────────────────────────

/// Resolve `parameters` into a [`Setup`].
///
/// The returned configuration has passed [`SimulationConfig::validate`].
/// The steady heat solve and the chemical-potential scaling of the
/// initial state are left to [`Setup::resolve_initial_state`].
pub fn build(parameters: &Parameters) -> Result<Setup, ConfigurationError> {
    let solving = &parameters.solving_parameters;
    let mode = solve_mode(solving)?;
    check_solving_settings(solving)?;

    let mesh = build_mesh(&parameters.mesh_parameters, &parameters.materials)?;
    let materials = MaterialTable::new(parameters.materials.clone(), mesh.as_ref())?;
    let cells = mesh.cell_count();
    let surfaces: Vec<u32> = mesh.surface_markers().to_vec();

    let n_traps = parameters.traps.len();
    let n_extrinsic = parameters.traps.iter().filter(|t| t.is_extrinsic()).count();
    let layout = FieldLayout::new(n_traps, n_extrinsic);
    let mut expressions = ExpressionClock::new();

    // Traps, in declaration order. Extrinsic densities take the next
    // free extrinsic field.
    let mut traps = Vec::with_capacity(n_traps);
    let mut damage = Vec::new();
    for (i, trap) in parameters.traps.iter().enumerate() {
        let context = format!("traps[{i}]");
        let kind = match trap.kind.as_deref() {
            None | Some("intrinsic") => {
                let density = require(&trap.density, &context, "density")?;
                TrapKind::Intrinsic {
                    density: expressions.register(format!("{context}.density"), density.clone()),
                }
            }
            Some("extrinsic") => {
                let field = layout.extrinsic[damage.len()];
                damage.push((i + 1, field, damage_law(trap, &context, &mut expressions)?));
                TrapKind::Extrinsic { field }
            }
            Some(other) => {
                return Err(ConfigurationError::InvalidValue {
                    key: format!("{context}.type"),
                    reason: format!("unknown trap type '{other}'"),
                })
            }
        };
        traps.push(TrapSpec {
            k_0: trap.k_0,
            e_k: trap.e_k,
            p_0: trap.p_0,
            e_p: trap.e_p,
            materials: trap.materials.clone(),
            kind,
        });
    }

    let transport_bcs = parameters
        .boundary_conditions
        .iter()
        .enumerate()
        .map(|(i, bc)| {
            transport_bc(
                bc,
                &format!("boundary_conditions[{i}]"),
                &surfaces,
                &mut expressions,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Temperature.
    let temp = &parameters.temperature;
    if temp.soret && materials.materials().iter().any(|m| m.heat_of_transport.is_none()) {
        return Err(ConfigurationError::InvalidValue {
            key: "temperature.soret".into(),
            reason: "the Soret effect needs H on every material".into(),
        });
    }
    let heat_mode = match temp.kind.as_str() {
        "expression" => {
            let value = require(&temp.value, "temperature", "value")?;
            HeatMode::Prescribed(expressions.register("temperature.value", value.clone()))
        }
        "solve_transient" => {
            if mode == SolveMode::Stationary {
                return Err(ConfigurationError::InvalidValue {
                    key: "temperature.type".into(),
                    reason: "solve_transient needs a transient run".into(),
                });
            }
            require(&temp.initial_condition, "temperature", "initial_condition")?;
            HeatMode::TransientPde
        }
        "solve_stationary" => HeatMode::StationaryPde,
        other => {
            return Err(ConfigurationError::UnknownTemperatureType {
                value: other.to_string(),
            })
        }
    };
    let heat_bcs = match heat_mode {
        HeatMode::Prescribed(_) => None,
        HeatMode::TransientPde | HeatMode::StationaryPde => {
            if !materials.has_thermal_properties() {
                return Err(ConfigurationError::InvalidValue {
                    key: "materials".into(),
                    reason: "heat transfer needs thermal_cond, heat_capacity and rho on every material"
                        .into(),
                });
            }
            let bcs = temp
                .boundary_conditions
                .iter()
                .enumerate()
                .map(|(i, bc)| {
                    heat_bc(
                        bc,
                        &format!("temperature.boundary_conditions[{i}]"),
                        &surfaces,
                        &mut expressions,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(bcs)
        }
    };
    let heat_source = temp
        .source
        .as_ref()
        .map(|s| expressions.register("temperature.source", s.clone()));
    let heat = |transient: bool| {
        let stage = HeatSubproblem::new(
            layout.temperature,
            heat_bcs.clone().unwrap_or_default(),
            transient,
        );
        match heat_source {
            Some(id) => stage.with_source(id),
            None => stage,
        }
    };

    // Initial values at t = 0.
    let initial_temperature = match heat_mode {
        HeatMode::Prescribed(_) => temp.value.as_ref(),
        _ => temp.initial_condition.as_ref(),
    };
    let temperature: Vec<f64> = (0..cells)
        .map(|c| {
            initial_temperature.map_or(DEFAULT_TEMPERATURE_GUESS, |e| {
                e.evaluate(&mesh.centroid(c), 0.0)
            })
        })
        .collect();
    let concentration = initial_concentration(parameters, mesh.as_ref(), &layout)?;
    let mut initial_values = vec![temperature, concentration];
    initial_values.extend(layout.extrinsic.iter().map(|_| vec![0.0; cells]));

    // Stages: temperature, then transport, then extrinsic densities.
    let mut stages: Vec<Box<dyn Subproblem>> = Vec::new();
    let mut heat_presolve = None;
    match heat_mode {
        HeatMode::Prescribed(id) => {
            stages.push(Box::new(PrescribedTemperature::new(layout.temperature, id)))
        }
        HeatMode::TransientPde => stages.push(Box::new(heat(true))),
        HeatMode::StationaryPde => heat_presolve = Some(heat(false)),
    }

    let strategy = match mode {
        SolveMode::Stationary => SolveStrategy::Once,
        SolveMode::Transient { .. } => SolveStrategy::Iterative,
    };
    let mut transport = TransportSubproblem::new(
        layout.clone(),
        traps,
        transport_bcs.clone(),
        strategy,
        solving.newton_solver,
    )
    .with_soret(temp.soret);
    if let Some(source) = &parameters.source_term {
        transport = transport.with_source(expressions.register("source_term", source.value.clone()));
    }
    let transport_index = stages.len();
    stages.push(Box::new(transport));

    if let SolveMode::Transient { .. } = mode {
        for (component, field, law) in damage {
            stages.push(Box::new(ExtrinsicTrapSubproblem::new(
                format!("extrinsic_trap_{component}"),
                field,
                layout.concentration,
                layout.temperature,
                component,
                layout.components(),
                Box::new(law),
            )));
        }
    } else if !damage.is_empty() {
        debug!("stationary run: extrinsic trap densities keep their initial value");
    }

    let adaptive = match mode {
        SolveMode::Transient { .. } => solving.adaptive_stepsize,
        SolveMode::Stationary => None,
    };

    // Exports.
    let exports = &parameters.exports;
    let mut post_processors: Vec<Box<dyn PostProcessor>> = Vec::new();
    if let Some(derived) = &exports.derived_quantities {
        post_processors.push(Box::new(DerivedQuantities::new(
            derived,
            mesh.as_ref(),
            n_traps,
            transport_bcs,
            heat_bcs,
        )?));
    }
    if let Some(xdmf) = &exports.xdmf {
        if xdmf.functions.len() != xdmf.labels.len() {
            return Err(ConfigurationError::InvalidValue {
                key: "exports.xdmf.labels".into(),
                reason: format!(
                    "{} labels for {} functions",
                    xdmf.labels.len(),
                    xdmf.functions.len()
                ),
            });
        }
        if xdmf.nb_iterations_between_exports == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "exports.xdmf.nb_iterations_between_exports".into(),
                reason: "must be at least 1".into(),
            });
        }
        let fields = xdmf
            .functions
            .iter()
            .zip(&xdmf.labels)
            .map(|(f, label)| {
                SolutionField::parse(f, n_traps)
                    .map(|field| (field, label.clone()))
                    .ok_or_else(|| ConfigurationError::InvalidValue {
                        key: "exports.xdmf.functions".into(),
                        reason: format!("unknown field '{f}'"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        post_processors.push(Box::new(FieldExport::new(
            fields,
            xdmf.nb_iterations_between_exports,
            xdmf.last_timestep_only,
            Box::new(CsvSnapshotWriter::new(&xdmf.folder)),
        )));
    }
    let errors = error_specs(parameters, n_traps)?;

    debug!(
        "setup: {cells} cells, {n_traps} traps ({n_extrinsic} extrinsic), {} stages, {} expressions",
        stages.len(),
        expressions.len()
    );

    let config = SimulationConfig {
        mesh,
        materials,
        layout,
        initial_values,
        expressions,
        stages,
        mode,
        adaptive,
        step_control_stage: adaptive.map(|_| transport_index),
        post_processors,
    };
    // Reject bad time, adaptive and pipeline settings before the steady
    // heat solve can run.
    config.validate()?;

    Ok(Setup {
        config,
        heat_mode,
        heat_presolve,
        errors,
        derived_output: exports.derived_quantities.clone(),
        initial_state_resolved: false,
    })
}

// ── Solving settings ───────────────────────────────────────────────

/// Resolve the solving type. A missing type means transient.
fn solve_mode(solving: &SolvingParameters) -> Result<SolveMode, ConfigurationError> {
    match solving.kind.as_deref() {
        None | Some("solve_transient") => Ok(SolveMode::Transient {
            final_time: *require(&solving.final_time, "solving_parameters", "final_time")?,
            initial_stepsize: *require(
                &solving.initial_stepsize,
                "solving_parameters",
                "initial_stepsize",
            )?,
        }),
        Some("solve_stationary") => Ok(SolveMode::Stationary),
        Some(other) => Err(ConfigurationError::UnknownSolvingType {
            value: other.to_string(),
        }),
    }
}

fn check_solving_settings(solving: &SolvingParameters) -> Result<(), ConfigurationError> {
    if let Some(element) = solving.traps_element_type.as_deref() {
        if element != "CG" && element != "DG" {
            return Err(ConfigurationError::InvalidValue {
                key: "solving_parameters.traps_element_type".into(),
                reason: format!("expected CG or DG, got '{element}'"),
            });
        }
    }
    let newton = &solving.newton_solver;
    let positive = [
        ("absolute_tolerance", newton.absolute_tolerance),
        ("relative_tolerance", newton.relative_tolerance),
        ("relaxation_parameter", newton.relaxation_parameter),
    ];
    for (key, value) in positive {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigurationError::InvalidValue {
                key: format!("solving_parameters.newton_solver.{key}"),
                reason: format!("must be finite and positive, got {value}"),
            });
        }
    }
    if newton.maximum_iterations == 0 {
        return Err(ConfigurationError::InvalidValue {
            key: "solving_parameters.newton_solver.maximum_iterations".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

fn require<'a, T>(
    value: &'a Option<T>,
    context: &str,
    key: &'static str,
) -> Result<&'a T, ConfigurationError> {
    value.as_ref().ok_or_else(|| ConfigurationError::MissingKey {
        context: context.to_string(),
        key,
    })
}

// ── Mesh ───────────────────────────────────────────────────────────

/// Build the mesh and mark its cells with material ids.
///
/// A lone material without borders covers the whole domain. Otherwise
/// every material needs `borders` and cells are marked by centroid x.
fn build_mesh(
    parameters: &MeshParameters,
    materials: &[Material],
) -> Result<Box<dyn Mesh>, ConfigurationError> {
    let with_borders = materials.iter().filter(|m| m.borders.is_some()).count();
    if materials.len() > 1 && with_borders != materials.len() {
        return Err(ConfigurationError::InvalidValue {
            key: "materials".into(),
            reason: "every material needs borders when there are several".into(),
        });
    }
    let whole_domain = match materials {
        [only] if only.borders.is_none() => only.id.first().copied(),
        _ => None,
    };
    let marker = |p: &Point| match whole_domain {
        Some(id) => id,
        None => materials
            .iter()
            .find(|m| m.contains_x(p[0]))
            .and_then(|m| m.id.first().copied())
            .unwrap_or(0),
    };

    Ok(match parameters {
        MeshParameters::Vertices { vertices } => {
            let mut mesh = IntervalMesh::from_vertices(vertices.clone())?;
            mesh.mark_volumes(marker);
            Box::new(mesh)
        }
        MeshParameters::Interval {
            size,
            initial_number_of_cells,
            refinements,
        } => {
            let refinements: Vec<Refinement> = refinements
                .iter()
                .map(|r| Refinement {
                    cells: r.cells,
                    x: r.x,
                })
                .collect();
            let mut mesh = IntervalMesh::refined(*size, *initial_number_of_cells, &refinements)?;
            mesh.mark_volumes(marker);
            Box::new(mesh)
        }
        MeshParameters::Rectangle { size, cells } => {
            let mut mesh = RectangleMesh::new(size[0], size[1], cells[0], cells[1])?;
            mesh.mark_volumes(marker);
            Box::new(mesh)
        }
    })
}

// ── Traps ──────────────────────────────────────────────────────────

fn damage_law(
    trap: &TrapParameters,
    context: &str,
    expressions: &mut ExpressionClock,
) -> Result<DamageCreation, ConfigurationError> {
    let mut register = |key: &'static str, value: &Option<Expression>| {
        require(value, context, key)
            .map(|e| expressions.register(format!("{context}.{key}"), e.clone()))
    };
    let phi_0 = register("phi_0", &trap.phi_0)?;
    let f_a = register("f_a", &trap.f_a)?;
    let f_b = register("f_b", &trap.f_b)?;
    let n_amax = *require(&trap.n_amax, context, "n_amax")?;
    let n_bmax = *require(&trap.n_bmax, context, "n_bmax")?;
    for (key, value) in [("n_amax", n_amax), ("n_bmax", n_bmax)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigurationError::InvalidValue {
                key: format!("{context}.{key}"),
                reason: format!("must be finite and positive, got {value}"),
            });
        }
    }
    Ok(DamageCreation {
        phi_0,
        n_amax,
        n_bmax,
        eta_a: *require(&trap.eta_a, context, "eta_a")?,
        eta_b: *require(&trap.eta_b, context, "eta_b")?,
        f_a,
        f_b,
    })
}

// ── Boundary conditions ────────────────────────────────────────────

fn check_surfaces(
    bc: &BoundaryConditionParameters,
    context: &str,
    surfaces: &[u32],
) -> Result<(), ConfigurationError> {
    match bc.surfaces.iter().find(|s| !surfaces.contains(s)) {
        Some(s) => Err(ConfigurationError::InvalidValue {
            key: format!("{context}.surfaces"),
            reason: format!("no surface {s} on the mesh"),
        }),
        None => Ok(()),
    }
}

fn unknown_bc(context: &str, kind: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: format!("{context}.type"),
        reason: format!("unknown boundary condition type '{kind}'"),
    }
}

fn transport_bc(
    bc: &BoundaryConditionParameters,
    context: &str,
    surfaces: &[u32],
    expressions: &mut ExpressionClock,
) -> Result<TransportBc, ConfigurationError> {
    check_surfaces(bc, context, surfaces)?;
    let mut register = |key: &'static str, value: &Option<Expression>| {
        require(value, context, key)
            .map(|e| expressions.register(format!("{context}.{key}"), e.clone()))
    };
    let kind = match bc.kind.as_str() {
        "dc" => TransportBcKind::Dirichlet {
            value: register("value", &bc.value)?,
        },
        "solubility" => TransportBcKind::Solubility {
            pressure: register("pressure", &bc.pressure)?,
            s_0: *require(&bc.s_0, context, "S_0")?,
            e_s: *require(&bc.e_s, context, "E_S")?,
        },
        "flux" => TransportBcKind::Flux {
            value: register("value", &bc.value)?,
        },
        "recomb" => TransportBcKind::Recombination {
            kr_0: *require(&bc.kr_0, context, "Kr_0")?,
            e_kr: *require(&bc.e_kr, context, "E_Kr")?,
        },
        other => return Err(unknown_bc(context, other)),
    };
    Ok(TransportBc {
        surfaces: bc.surfaces.clone(),
        kind,
    })
}

fn heat_bc(
    bc: &BoundaryConditionParameters,
    context: &str,
    surfaces: &[u32],
    expressions: &mut ExpressionClock,
) -> Result<HeatBc, ConfigurationError> {
    check_surfaces(bc, context, surfaces)?;
    let mut register = |key: &'static str, value: &Option<Expression>| {
        require(value, context, key)
            .map(|e| expressions.register(format!("{context}.{key}"), e.clone()))
    };
    let kind = match bc.kind.as_str() {
        "dc" => HeatBcKind::Dirichlet {
            value: register("value", &bc.value)?,
        },
        "flux" => HeatBcKind::Flux {
            value: register("value", &bc.value)?,
        },
        "convective_flux" => HeatBcKind::Convective {
            h_coeff: register("h_coeff", &bc.h_coeff)?,
            t_ext: register("T_ext", &bc.t_ext)?,
        },
        other => return Err(unknown_bc(context, other)),
    };
    Ok(HeatBc {
        surfaces: bc.surfaces.clone(),
        kind,
    })
}

// ── Initial state and errors ───────────────────────────────────────

/// Physical initial concentrations, zero where none is given.
fn initial_concentration(
    parameters: &Parameters,
    mesh: &dyn Mesh,
    layout: &FieldLayout,
) -> Result<Vec<f64>, ConfigurationError> {
    let m = layout.components();
    let mut values = vec![0.0; mesh.cell_count() * m];
    for (i, ic) in parameters.initial_conditions.iter().enumerate() {
        if ic.component >= m {
            return Err(ConfigurationError::InvalidValue {
                key: format!("initial_conditions[{i}].component"),
                reason: format!("{} is not below {m} components", ic.component),
            });
        }
        for cell in 0..mesh.cell_count() {
            values[layout.index(cell, ic.component)] =
                ic.value.evaluate(&mesh.centroid(cell), 0.0);
        }
    }
    Ok(values)
}

fn error_specs(
    parameters: &Parameters,
    n_traps: usize,
) -> Result<Vec<ErrorSpec>, ConfigurationError> {
    let Some(requested) = &parameters.exports.error else {
        return Ok(Vec::new());
    };
    requested
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let key = |k: &str| format!("exports.error[{i}].{k}");
            let norm = ErrorNorm::parse(&e.norm).ok_or_else(|| ConfigurationError::InvalidValue {
                key: key("norm"),
                reason: format!("expected error_max or L2, got '{}'", e.norm),
            })?;
            if e.exact_solutions.len() != e.computed_solutions.len() {
                return Err(ConfigurationError::InvalidValue {
                    key: key("computed_solutions"),
                    reason: format!(
                        "{} computed solutions for {} exact solutions",
                        e.computed_solutions.len(),
                        e.exact_solutions.len()
                    ),
                });
            }
            if let Some(&bad) = e.computed_solutions.iter().find(|&&c| c > n_traps + 1) {
                return Err(ConfigurationError::InvalidValue {
                    key: key("computed_solutions"),
                    reason: format!("index {bad} exceeds {}", n_traps + 1),
                });
            }
            Ok(ErrorSpec {
                exact_solutions: e.exact_solutions.clone(),
                computed_solutions: e.computed_solutions.clone(),
                norm,
            })
        })
        .collect()
}
