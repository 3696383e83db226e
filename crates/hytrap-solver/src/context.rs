//! Execution context passed to subproblems during a step.

use hytrap_core::{FieldId, FieldReader, FieldWriter, SolveError, StepIndex};
use hytrap_expr::ExpressionClock;
use hytrap_materials::{MaterialTable, PropertySnapshot};
use hytrap_mesh::Mesh;

/// Where in the simulation a stage is running.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    /// Index of the step being computed.
    pub index: StepIndex,
    /// Simulation time the step solves for.
    pub time: f64,
    /// Step size; `None` for a stationary solve.
    pub dt: Option<f64>,
}

impl StepInfo {
    /// A stationary solve at `t = 0`.
    pub fn stationary() -> Self {
        Self {
            index: StepIndex(0),
            time: 0.0,
            dt: None,
        }
    }

    /// A transient step.
    pub fn transient(index: StepIndex, time: f64, dt: f64) -> Self {
        Self {
            index,
            time,
            dt: Some(dt),
        }
    }
}

/// Execution context for [`Subproblem::solve`](crate::Subproblem::solve).
///
/// Uses dynamic dispatch (`&dyn FieldReader`, `&mut dyn FieldWriter`) so
/// stages stay object-safe and can be driven by mocks in tests.
///
/// - **`reads()`** sees the most recent write from an earlier stage in
///   this step, or the committed value if none wrote the field.
/// - **`reads_previous()`** always sees the committed generation, i.e.
///   the end of the previous step.
pub struct SolveContext<'a> {
    reads: &'a dyn FieldReader,
    reads_previous: &'a dyn FieldReader,
    writes: &'a mut dyn FieldWriter,
    mesh: &'a dyn Mesh,
    properties: &'a PropertySnapshot,
    materials: &'a MaterialTable,
    expressions: &'a ExpressionClock,
    step: StepInfo,
}

impl<'a> SolveContext<'a> {
    /// Construct a context. Called by the engine, or by tests with mocks.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reads: &'a dyn FieldReader,
        reads_previous: &'a dyn FieldReader,
        writes: &'a mut dyn FieldWriter,
        mesh: &'a dyn Mesh,
        properties: &'a PropertySnapshot,
        materials: &'a MaterialTable,
        expressions: &'a ExpressionClock,
        step: StepInfo,
    ) -> Self {
        Self {
            reads,
            reads_previous,
            writes,
            mesh,
            properties,
            materials,
            expressions,
            step,
        }
    }

    /// In-step overlay reader.
    pub fn reads(&self) -> &dyn FieldReader {
        self.reads
    }

    /// Committed-generation reader.
    pub fn reads_previous(&self) -> &dyn FieldReader {
        self.reads_previous
    }

    /// Writer for the stage's declared outputs.
    pub fn writes(&mut self) -> &mut dyn FieldWriter {
        self.writes
    }

    /// Read a field through the overlay, failing if it is not routed.
    pub fn read(&self, field: FieldId) -> Result<&'a [f64], SolveError> {
        let reads: &'a dyn FieldReader = self.reads;
        reads.read(field).ok_or(SolveError::FieldUnavailable { field })
    }

    /// Read a field's committed value, failing if it is absent.
    pub fn read_previous(&self, field: FieldId) -> Result<&'a [f64], SolveError> {
        let reads: &'a dyn FieldReader = self.reads_previous;
        reads.read(field).ok_or(SolveError::FieldUnavailable { field })
    }

    /// Mutable buffer for a declared output.
    pub fn write(&mut self, field: FieldId) -> Result<&mut [f64], SolveError> {
        self.writes
            .write(field)
            .ok_or(SolveError::FieldUnavailable { field })
    }

    /// The mesh.
    pub fn mesh(&self) -> &'a dyn Mesh {
        self.mesh
    }

    /// Material properties at the current temperature.
    pub fn properties(&self) -> &'a PropertySnapshot {
        self.properties
    }

    /// Material table, for stages that evaluate properties at trial
    /// temperatures.
    pub fn materials(&self) -> &'a MaterialTable {
        self.materials
    }

    /// Expression clock, already advanced to [`StepInfo::time`].
    pub fn expressions(&self) -> &'a ExpressionClock {
        self.expressions
    }

    /// Step index, time, and size.
    pub fn step(&self) -> StepInfo {
        self.step
    }
}
