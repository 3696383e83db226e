//! The one-call entry point: parameters in, [`Output`] out.

use std::error::Error;
use std::fmt;

use hytrap_core::{SolveError, StepError};
use log::{debug, info};

use crate::config::ConfigurationError;
use crate::export::{export_parameters, write_derived_quantities, ExportError};
use crate::output::{compute_errors, make_output, Output};
use crate::parameters::Parameters;
use crate::setup;
use crate::simulation::Simulation;

/// Anything that can stop [`run`].
#[derive(Debug)]
pub enum RunError {
    /// Rejected before any solve.
    Configuration(ConfigurationError),
    /// A step failed and could not be recovered.
    Step(StepError),
    /// A requested file could not be written.
    Export(ExportError),
    /// The final solutions could not be assembled.
    Output(SolveError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "configuration error: {e}"),
            Self::Step(e) => write!(f, "step failed: {e}"),
            Self::Export(e) => write!(f, "export failed: {e}"),
            Self::Output(e) => write!(f, "output failed: {e}"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(e) => Some(e),
            Self::Step(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Output(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for RunError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e)
    }
}

impl From<StepError> for RunError {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

impl From<ExportError> for RunError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

impl From<SolveError> for RunError {
    fn from(e: SolveError) -> Self {
        Self::Output(e)
    }
}

/// Run a simulation to completion.
///
/// 1. Echo the parameters to JSON, if requested. Failure is logged and
///    ignored.
/// 2. Resolve the parameters and the initial state.
/// 3. Step until the final time (transient) or solve once (stationary).
/// 4. Flush snapshots, assemble the [`Output`], evaluate error norms
///    and write the derived-quantity table.
pub fn run(parameters: Parameters) -> Result<Output, RunError> {
    if let Some(stem) = &parameters.exports.parameters {
        match export_parameters(&parameters, stem) {
            Ok(path) => debug!("parameters written to {}", path.display()),
            Err(e) => debug!("parameters not exported: {e}"),
        }
    }

    let mut setup = setup::build(&parameters)?;
    setup
        .resolve_initial_state()
        .map_err(|reason| StepError::SubproblemFailed {
            name: "heat".into(),
            reason,
        })?;
    let errors = std::mem::take(&mut setup.errors);
    let derived_output = setup.derived_output.take();

    let mut simulation = Simulation::new(setup.config)?;
    let summary = simulation.run()?;
    simulation.finish_post_processing()?;
    info!(
        "finished: {} steps ({} rejected), t = {:e} s",
        summary.steps, summary.rejected_steps, summary.final_time
    );

    let solutions = make_output(
        &simulation.current(),
        simulation.layout(),
        simulation.properties(),
    )?;
    let error = if errors.is_empty() {
        None
    } else {
        Some(compute_errors(
            &errors,
            &solutions,
            simulation.mesh(),
            simulation.clock().time(),
        )?)
    };
    let derived_quantities = match &derived_output {
        Some(spec) => {
            let table = simulation.derived_quantities().clone();
            let path = write_derived_quantities(spec, &table)?;
            debug!("derived quantities written to {}", path.display());
            Some(table)
        }
        None => None,
    };

    Ok(Output {
        parameters,
        mesh: simulation.into_mesh(),
        solutions,
        error,
        derived_quantities,
        summary,
    })
}
