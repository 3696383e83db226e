//! Simulation parameters.
//!
//! [`Parameters`] mirrors the JSON configuration a simulation is
//! described by. Deserialization only checks shape; semantic checks
//! (unknown type strings, missing keys for the chosen mode) happen in
//! [`setup`](crate::setup) and return
//! [`ConfigurationError`](crate::ConfigurationError).
//!
//! Expression-valued keys accept a number in JSON. Space- or
//! time-dependent inputs are closures set in code, which the parameter
//! export cannot serialize.

use std::fs;
use std::path::Path;

use hytrap_expr::Expression;
use hytrap_materials::{one_or_many, Material, MaterialIds};
use hytrap_solver::NewtonSettings;
use serde::{Deserialize, Serialize};

use crate::config::ConfigurationError;

/// Complete description of one simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameters {
    /// Geometry.
    pub mesh_parameters: MeshParameters,
    /// Materials, one per volume subdomain (or group of subdomains).
    pub materials: Vec<Material>,
    /// Traps in declaration order. Trap `i` is concentration component
    /// `i + 1`.
    #[serde(default)]
    pub traps: Vec<TrapParameters>,
    /// Hydrogen transport boundary conditions.
    #[serde(default)]
    pub boundary_conditions: Vec<BoundaryConditionParameters>,
    /// Volumetric source of mobile hydrogen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_term: Option<SourceTerm>,
    /// Initial concentrations; unset components start at zero.
    #[serde(default)]
    pub initial_conditions: Vec<InitialCondition>,
    /// How temperature is obtained.
    pub temperature: TemperatureParameters,
    /// Time integration and Newton settings.
    pub solving_parameters: SolvingParameters,
    /// Requested outputs.
    #[serde(default)]
    pub exports: Exports,
}

impl Parameters {
    /// Parse parameters from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Parse {
            reason: e.to_string(),
        })
    }

    /// Read and parse a JSON parameter file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ConfigurationError::Parse {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }
}

// ── Mesh ────────────────────────────────────────────────────────

/// Mesh description. The variant is recognised from the keys present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeshParameters {
    /// 1D mesh with explicit vertex coordinates.
    Vertices {
        /// Strictly increasing x coordinates.
        vertices: Vec<f64>,
    },
    /// 2D structured rectangle `[0, lx] x [0, ly]`.
    Rectangle {
        /// `[lx, ly]`.
        size: [f64; 2],
        /// `[nx, ny]`.
        cells: [usize; 2],
    },
    /// 1D uniform mesh over `[0, size]` with optional local refinement.
    Interval {
        /// Domain length.
        size: f64,
        /// Cells before refinement.
        initial_number_of_cells: usize,
        /// Applied in order.
        #[serde(default)]
        refinements: Vec<RefinementParameters>,
    },
}

/// Local refinement: bisect cells left of `x` until there are at least
/// `cells` of them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementParameters {
    /// Minimum cell count left of `x`.
    pub cells: usize,
    /// Right edge of the refined region.
    pub x: f64,
}

// ── Traps ───────────────────────────────────────────────────────

/// One trap. Intrinsic traps need `density`; extrinsic traps
/// (`"type": "extrinsic"`) need the damage-creation keys instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrapParameters {
    /// Trapping rate pre-factor, m^3/s.
    pub k_0: f64,
    /// Trapping activation energy, eV.
    #[serde(rename = "E_k")]
    pub e_k: f64,
    /// Detrapping rate pre-factor, 1/s.
    pub p_0: f64,
    /// Detrapping activation energy, eV.
    #[serde(rename = "E_p")]
    pub e_p: f64,
    /// Volume markers the trap exists in.
    #[serde(deserialize_with = "one_or_many")]
    pub materials: MaterialIds,
    /// Site density of an intrinsic trap, m^-3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<Expression>,
    /// `"extrinsic"`, or absent for an intrinsic trap.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Incident flux driving trap creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phi_0: Option<Expression>,
    /// Saturation density of creation channel a.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_amax: Option<f64>,
    /// Saturation density of creation channel b.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_bmax: Option<f64>,
    /// Efficiency of channel a.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_a: Option<f64>,
    /// Efficiency of channel b.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_b: Option<f64>,
    /// Spatial distribution of channel a.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_a: Option<Expression>,
    /// Spatial distribution of channel b.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_b: Option<Expression>,
}

impl TrapParameters {
    /// An intrinsic trap with constant rates and density.
    pub fn intrinsic(
        k_0: f64,
        e_k: f64,
        p_0: f64,
        e_p: f64,
        density: impl Into<Expression>,
        materials: &[u32],
    ) -> Self {
        Self {
            k_0,
            e_k,
            p_0,
            e_p,
            materials: MaterialIds::from_slice(materials),
            density: Some(density.into()),
            kind: None,
            phi_0: None,
            n_amax: None,
            n_bmax: None,
            eta_a: None,
            eta_b: None,
            f_a: None,
            f_b: None,
        }
    }

    /// Whether this trap's density is a solved field.
    pub fn is_extrinsic(&self) -> bool {
        self.kind.as_deref() == Some("extrinsic")
    }
}

// ── Boundary conditions and sources ─────────────────────────────

/// A boundary condition. Which keys are needed depends on `type`:
///
/// | `type` | keys |
/// |---|---|
/// | `dc` | `value` |
/// | `solubility` | `pressure`, `S_0`, `E_S` |
/// | `flux` | `value` |
/// | `recomb` | `Kr_0`, `E_Kr` |
/// | `convective_flux` (heat only) | `h_coeff`, `T_ext` |
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoundaryConditionParameters {
    /// Condition type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Surface markers.
    #[serde(deserialize_with = "one_or_many")]
    pub surfaces: MaterialIds,
    /// Imposed value or flux.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expression>,
    /// Gas pressure for Sieverts' law, Pa.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<Expression>,
    /// Solubility pre-factor for Sieverts' law.
    #[serde(rename = "S_0", default, skip_serializing_if = "Option::is_none")]
    pub s_0: Option<f64>,
    /// Solubility activation energy, eV.
    #[serde(rename = "E_S", default, skip_serializing_if = "Option::is_none")]
    pub e_s: Option<f64>,
    /// Recombination pre-factor.
    #[serde(rename = "Kr_0", default, skip_serializing_if = "Option::is_none")]
    pub kr_0: Option<f64>,
    /// Recombination activation energy, eV.
    #[serde(rename = "E_Kr", default, skip_serializing_if = "Option::is_none")]
    pub e_kr: Option<f64>,
    /// Convective heat transfer coefficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_coeff: Option<Expression>,
    /// External temperature for convective exchange.
    #[serde(rename = "T_ext", default, skip_serializing_if = "Option::is_none")]
    pub t_ext: Option<Expression>,
}

impl BoundaryConditionParameters {
    fn empty(kind: &str, surfaces: &[u32]) -> Self {
        Self {
            kind: kind.to_string(),
            surfaces: MaterialIds::from_slice(surfaces),
            value: None,
            pressure: None,
            s_0: None,
            e_s: None,
            kr_0: None,
            e_kr: None,
            h_coeff: None,
            t_ext: None,
        }
    }

    /// A `dc` condition.
    pub fn dirichlet(surfaces: &[u32], value: impl Into<Expression>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::empty("dc", surfaces)
        }
    }

    /// A `flux` condition.
    pub fn flux(surfaces: &[u32], value: impl Into<Expression>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::empty("flux", surfaces)
        }
    }

    /// A `recomb` condition.
    pub fn recombination(surfaces: &[u32], kr_0: f64, e_kr: f64) -> Self {
        Self {
            kr_0: Some(kr_0),
            e_kr: Some(e_kr),
            ..Self::empty("recomb", surfaces)
        }
    }
}

/// Volumetric source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceTerm {
    /// Source density.
    pub value: Expression,
}

/// Initial value of one concentration component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitialCondition {
    /// Physical concentration.
    pub value: Expression,
    /// Component: 0 is mobile, `i` is trap `i`.
    #[serde(default)]
    pub component: usize,
}

// ── Temperature ─────────────────────────────────────────────────

/// Temperature configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemperatureParameters {
    /// `expression`, `solve_transient` or `solve_stationary`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Temperature expression (`expression` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expression>,
    /// Initial temperature (`solve_transient`), also the Newton guess
    /// for `solve_stationary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_condition: Option<Expression>,
    /// Heat boundary conditions.
    #[serde(default)]
    pub boundary_conditions: Vec<BoundaryConditionParameters>,
    /// Volumetric heat source, W/m^3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Expression>,
    /// Include the Soret term in the transport equation.
    #[serde(default)]
    pub soret: bool,
}

impl TemperatureParameters {
    /// A prescribed temperature.
    pub fn expression(value: impl Into<Expression>) -> Self {
        Self {
            kind: "expression".into(),
            value: Some(value.into()),
            initial_condition: None,
            boundary_conditions: Vec::new(),
            source: None,
            soret: false,
        }
    }
}

// ── Solving ─────────────────────────────────────────────────────

/// Time integration settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SolvingParameters {
    /// `solve_transient` (default) or `solve_stationary`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// End time, s. Required for transient runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_time: Option<f64>,
    /// First step size, s. Required for transient runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_stepsize: Option<f64>,
    /// Newton criteria for the transport solve.
    #[serde(default)]
    pub newton_solver: NewtonSettings,
    /// `CG` or `DG`. Accepted for compatibility; every unknown is
    /// cell-centred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traps_element_type: Option<String>,
    /// Enables step-size adaptation when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive_stepsize: Option<AdaptiveStepsize>,
}

impl SolvingParameters {
    /// Transient settings with a fixed step.
    pub fn transient(final_time: f64, initial_stepsize: f64) -> Self {
        Self {
            kind: Some("solve_transient".into()),
            final_time: Some(final_time),
            initial_stepsize: Some(initial_stepsize),
            ..Self::default()
        }
    }

    /// Steady-state settings.
    pub fn stationary() -> Self {
        Self {
            kind: Some("solve_stationary".into()),
            ..Self::default()
        }
    }
}

/// Step-size adaptation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveStepsize {
    /// Factor the step grows or shrinks by. Must exceed 1.
    pub stepsize_change_ratio: f64,
    /// Smallest step allowed after a reduction.
    pub dt_min: f64,
    /// Time after which the step is capped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_stop: Option<f64>,
    /// Cap applied once `t >= t_stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stepsize_stop_max: Option<f64>,
}

// ── Exports ─────────────────────────────────────────────────────

/// Requested outputs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Exports {
    /// Field snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xdmf: Option<FieldExportParameters>,
    /// Derived-quantity table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_quantities: Option<DerivedQuantitiesParameters>,
    /// Error norms against exact solutions, at the final time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<ErrorParameters>>,
    /// Path of the parameter echo, without the `.json` extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

/// Field snapshot export.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldExportParameters {
    /// Fields to export: `solute`, `retention`, `T`, or a trap index.
    pub functions: Vec<String>,
    /// One label per function; names the output file.
    pub labels: Vec<String>,
    /// Output directory.
    pub folder: String,
    /// Export every n-th step.
    #[serde(default = "one")]
    pub nb_iterations_between_exports: usize,
    /// Export the final step only.
    #[serde(default)]
    pub last_timestep_only: bool,
}

fn one() -> usize {
    1
}

/// A field over some surfaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceQuantity {
    /// Field name.
    pub field: String,
    /// Surface markers.
    pub surfaces: Vec<u32>,
}

/// A field over some volumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeQuantity {
    /// Field name.
    pub field: String,
    /// Volume markers.
    pub volumes: Vec<u32>,
}

/// Derived-quantity table configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DerivedQuantitiesParameters {
    /// CSV file name.
    pub file: String,
    /// Output directory.
    pub folder: String,
    /// Outward fluxes.
    #[serde(default)]
    pub surface_flux: Vec<SurfaceQuantity>,
    /// Volume averages.
    #[serde(default)]
    pub average_volume: Vec<VolumeQuantity>,
    /// Volume minima.
    #[serde(default)]
    pub minimum_volume: Vec<VolumeQuantity>,
    /// Volume maxima.
    #[serde(default)]
    pub maximum_volume: Vec<VolumeQuantity>,
    /// Volume integrals.
    #[serde(default)]
    pub total_volume: Vec<VolumeQuantity>,
    /// Surface integrals.
    #[serde(default)]
    pub total_surface: Vec<SurfaceQuantity>,
}

/// One error computation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorParameters {
    /// Exact solutions, one per computed solution.
    pub exact_solutions: Vec<Expression>,
    /// Indices into `[solute, trap_1, .., trap_n, T]`.
    pub computed_solutions: Vec<usize>,
    /// `error_max` or `L2`.
    pub norm: String,
}
