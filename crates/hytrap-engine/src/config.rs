//! Simulation configuration, validation, and error types.
//!
//! [`SimulationConfig`] is the builder-input for a [`Simulation`]: the
//! mesh, materials, stage pipeline, initial fields and time settings,
//! already resolved from [`Parameters`](crate::Parameters) by
//! [`setup::build`](crate::setup::build) or assembled by hand in tests.
//! [`validate()`](SimulationConfig::validate) checks structural
//! invariants; [`Simulation::new`] calls it and then builds the
//! [`ExecutionPlan`](hytrap_solver::ExecutionPlan).
//!
//! [`Simulation`]: crate::Simulation
//! [`Simulation::new`]: crate::Simulation::new

use std::error::Error;
use std::fmt;

use hytrap_expr::ExpressionClock;
use hytrap_materials::{MaterialError, MaterialTable};
use hytrap_mesh::{Mesh, MeshError};
use hytrap_solver::{validate_pipeline, FieldLayout, PipelineError, Subproblem};

use crate::parameters::AdaptiveStepsize;
use crate::postprocess::PostProcessor;

// ── SolveMode ──────────────────────────────────────────────────────

/// Whether the simulation marches in time or solves a steady state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolveMode {
    /// Step from `t = 0` until `final_time`.
    Transient {
        /// End time, s.
        final_time: f64,
        /// First step size, s.
        initial_stepsize: f64,
    },
    /// One steady-state solve, no commit.
    Stationary,
}

impl SolveMode {
    /// The initial step size, if transient.
    pub fn dt(&self) -> Option<f64> {
        match self {
            Self::Transient {
                initial_stepsize, ..
            } => Some(*initial_stepsize),
            Self::Stationary => None,
        }
    }
}

// ── ConfigurationError ─────────────────────────────────────────────

/// Errors detected while resolving parameters or validating a
/// [`SimulationConfig`]. Always raised before any solve.
#[derive(Debug, PartialEq)]
pub enum ConfigurationError {
    /// The parameter document could not be read or parsed.
    Parse {
        /// Parser message.
        reason: String,
    },
    /// `solving_parameters.type` is not a known mode.
    UnknownSolvingType {
        /// The configured value.
        value: String,
    },
    /// `temperature.type` is not a known mode.
    UnknownTemperatureType {
        /// The configured value.
        value: String,
    },
    /// A key required by the chosen configuration is absent.
    MissingKey {
        /// Where the key was expected, e.g. `traps[1]`.
        context: String,
        /// The missing key.
        key: &'static str,
    },
    /// A value is present but unusable.
    InvalidValue {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Some materials define `S_0` and some do not.
    MixedChemicalPotential {
        /// Volume markers of materials without `S_0`.
        missing: Vec<u32>,
    },
    /// Stage pipeline validation failed.
    Pipeline(PipelineError),
    /// The mesh could not be built.
    Mesh(MeshError),
    /// The material table could not be built.
    Material(MaterialError),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { reason } => write!(f, "could not parse parameters: {reason}"),
            Self::UnknownSolvingType { value } => write!(f, "{value} unknown solving type"),
            Self::UnknownTemperatureType { value } => {
                write!(f, "{value} unknown temperature type")
            }
            Self::MissingKey { context, key } => write!(f, "{context}: missing key '{key}'"),
            Self::InvalidValue { key, reason } => write!(f, "{key}: {reason}"),
            Self::MixedChemicalPotential { missing } => write!(
                f,
                "S_0 must be set on every material or none; missing on {missing:?}"
            ),
            Self::Pipeline(e) => write!(f, "pipeline: {e}"),
            Self::Mesh(e) => write!(f, "mesh: {e}"),
            Self::Material(e) => write!(f, "materials: {e}"),
        }
    }
}

impl Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Pipeline(e) => Some(e),
            Self::Mesh(e) => Some(e),
            Self::Material(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PipelineError> for ConfigurationError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<MeshError> for ConfigurationError {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

impl From<MaterialError> for ConfigurationError {
    fn from(e: MaterialError) -> Self {
        match e {
            MaterialError::MixedChemicalPotential { missing } => {
                Self::MixedChemicalPotential { missing }
            }
            other => Self::Material(other),
        }
    }
}

// ── SimulationConfig ───────────────────────────────────────────────

/// Complete configuration for constructing a [`Simulation`](crate::Simulation).
pub struct SimulationConfig {
    /// Spatial domain.
    pub mesh: Box<dyn Mesh>,
    /// Cell-to-material mapping.
    pub materials: MaterialTable,
    /// Field ids. Field `n` of [`FieldLayout::field_defs`] is `FieldId(n)`.
    pub layout: FieldLayout,
    /// Initial value of every field, indexed by field id.
    pub initial_values: Vec<Vec<f64>>,
    /// Every expression the stages and post-processors evaluate.
    pub expressions: ExpressionClock,
    /// Stages executed in order each step.
    pub stages: Vec<Box<dyn Subproblem>>,
    /// Transient or stationary.
    pub mode: SolveMode,
    /// Step-size adaptation, transient only.
    pub adaptive: Option<AdaptiveStepsize>,
    /// Stage whose Newton iteration count drives step-size adaptation.
    pub step_control_stage: Option<usize>,
    /// Sinks invoked after every successful step, in order.
    pub post_processors: Vec<Box<dyn PostProcessor>>,
}

impl SimulationConfig {
    /// Validate all structural invariants.
    ///
    /// Pure validation; [`Simulation::new`](crate::Simulation::new) calls
    /// `validate_pipeline()` again to obtain the plan.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        // 1. Mesh must have at least one cell.
        let cells = self.mesh.cell_count();
        if cells == 0 {
            return Err(ConfigurationError::Mesh(MeshError::EmptyMesh));
        }
        // 2. Material table must cover the mesh.
        if self.materials.cell_count() != cells {
            return Err(ConfigurationError::InvalidValue {
                key: "materials".into(),
                reason: format!(
                    "table covers {} cells, mesh has {cells}",
                    self.materials.cell_count()
                ),
            });
        }
        // 3. One initial buffer per field, each of storage length.
        let defs = self.layout.field_defs();
        if self.initial_values.len() != defs.len() {
            return Err(ConfigurationError::InvalidValue {
                key: "initial_values".into(),
                reason: format!(
                    "{} buffers for {} fields",
                    self.initial_values.len(),
                    defs.len()
                ),
            });
        }
        for (def, values) in defs.iter().zip(&self.initial_values) {
            def.validate().map_err(|reason| ConfigurationError::InvalidValue {
                key: def.name.clone(),
                reason,
            })?;
            if values.len() != def.storage_len(cells) {
                return Err(ConfigurationError::InvalidValue {
                    key: def.name.clone(),
                    reason: format!(
                        "initial value has {} entries, expected {}",
                        values.len(),
                        def.storage_len(cells)
                    ),
                });
            }
        }
        // 4. Time settings.
        if let SolveMode::Transient {
            final_time,
            initial_stepsize,
        } = self.mode
        {
            if !final_time.is_finite() || final_time <= 0.0 {
                return Err(ConfigurationError::InvalidValue {
                    key: "final_time".into(),
                    reason: format!("must be finite and positive, got {final_time}"),
                });
            }
            if !initial_stepsize.is_finite() || initial_stepsize <= 0.0 {
                return Err(ConfigurationError::InvalidValue {
                    key: "initial_stepsize".into(),
                    reason: format!("must be finite and positive, got {initial_stepsize}"),
                });
            }
        }
        // 5. Adaptive stepping invariants.
        if let Some(a) = &self.adaptive {
            if !a.stepsize_change_ratio.is_finite() || a.stepsize_change_ratio <= 1.0 {
                return Err(ConfigurationError::InvalidValue {
                    key: "stepsize_change_ratio".into(),
                    reason: format!("must be finite and > 1, got {}", a.stepsize_change_ratio),
                });
            }
            if !a.dt_min.is_finite() || a.dt_min <= 0.0 {
                return Err(ConfigurationError::InvalidValue {
                    key: "dt_min".into(),
                    reason: format!("must be finite and positive, got {}", a.dt_min),
                });
            }
            if let Some(max) = a.stepsize_stop_max {
                if !max.is_finite() || max <= 0.0 {
                    return Err(ConfigurationError::InvalidValue {
                        key: "stepsize_stop_max".into(),
                        reason: format!("must be finite and positive, got {max}"),
                    });
                }
            }
        }
        if let Some(i) = self.step_control_stage {
            if i >= self.stages.len() {
                return Err(ConfigurationError::InvalidValue {
                    key: "step_control_stage".into(),
                    reason: format!("index {i} but only {} stages", self.stages.len()),
                });
            }
        }
        // 6. Pipeline validation (delegates to hytrap-solver).
        let _ = validate_pipeline(
            &self.stages,
            &self.layout.defined_fields(),
            self.layout.temperature,
            self.mode.dt(),
        )?;
        Ok(())
    }
}
