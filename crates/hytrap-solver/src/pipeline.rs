//! Pipeline validation and read routing.
//!
//! [`validate_pipeline`] runs once at setup to check the stage list for
//! structural errors and build the [`ExecutionPlan`]: a precomputed
//! routing table plus the list of stages after which material properties
//! must be refreshed.

use std::error::Error;
use std::fmt;

use hytrap_core::{FieldId, FieldSet};
use indexmap::IndexMap;

use crate::subproblem::{Subproblem, WriteMode};

// ── Read routing ───────────────────────────────────────────────────

/// Where a stage reads a field from during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// The committed generation (end of the previous step).
    Committed,
    /// The staged output of an earlier stage in this step.
    Staged {
        /// Index of the writing stage in the pipeline.
        writer_index: usize,
    },
}

/// Precomputed routing for a validated pipeline.
///
/// Maps each `(stage, field)` read to its [`ReadSource`] and each written
/// field to its [`WriteMode`]. Also records which stages write the
/// temperature field; the engine refreshes the property snapshot after
/// each of them.
#[derive(Debug)]
#[must_use]
pub struct ExecutionPlan {
    routes: Vec<IndexMap<FieldId, ReadSource>>,
    write_modes: Vec<IndexMap<FieldId, WriteMode>>,
    refresh_after: Vec<bool>,
}

impl ExecutionPlan {
    /// Number of stages in the plan.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the plan covers zero stages.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Read source for a field in a given stage.
    pub fn source(&self, stage_index: usize, field: FieldId) -> Option<ReadSource> {
        self.routes.get(stage_index)?.get(&field).copied()
    }

    /// All `(field, source)` pairs for a stage.
    pub fn routes_for(&self, stage_index: usize) -> Option<&IndexMap<FieldId, ReadSource>> {
        self.routes.get(stage_index)
    }

    /// Write mode for a field in a given stage.
    pub fn write_mode(&self, stage_index: usize, field: FieldId) -> Option<WriteMode> {
        self.write_modes.get(stage_index)?.get(&field).copied()
    }

    /// All `(field, mode)` pairs for a stage's writes.
    pub fn write_modes_for(&self, stage_index: usize) -> Option<&IndexMap<FieldId, WriteMode>> {
        self.write_modes.get(stage_index)
    }

    /// Whether material properties must be refreshed after this stage.
    pub fn refreshes_properties(&self, stage_index: usize) -> bool {
        self.refresh_after.get(stage_index).copied().unwrap_or(false)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Two stages writing the same field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConflict {
    /// The contested field.
    pub field_id: FieldId,
    /// Name of the earlier writer.
    pub first_writer: String,
    /// Name of the later writer.
    pub second_writer: String,
}

/// Errors from pipeline validation.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No stages registered.
    EmptyPipeline,

    /// Two or more stages write the same field.
    WriteConflict(Vec<WriteConflict>),

    /// A stage references a field that is not defined.
    UndefinedField {
        /// Which stage.
        stage: String,
        /// The missing field.
        field_id: FieldId,
    },

    /// The configured step size is NaN, infinite, zero or negative.
    InvalidDt {
        /// The invalid value.
        value: f64,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPipeline => write!(f, "pipeline has no stages"),
            Self::WriteConflict(conflicts) => {
                write!(f, "write-write conflicts: ")?;
                for (i, c) in conflicts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(
                        f,
                        "field {} written by '{}' and '{}'",
                        c.field_id, c.first_writer, c.second_writer,
                    )?;
                }
                Ok(())
            }
            Self::UndefinedField { stage, field_id } => {
                write!(f, "stage '{stage}' references undefined field {field_id}")
            }
            Self::InvalidDt { value } => {
                write!(f, "step size must be finite and positive, got {value}")
            }
        }
    }
}

impl Error for PipelineError {}

// ── Validation ─────────────────────────────────────────────────────

/// Validate a stage pipeline and build the [`ExecutionPlan`].
///
/// Checks, in order:
///
/// 1. `dt`, when given, is finite and positive.
/// 2. The pipeline is non-empty.
/// 3. No two stages write the same field.
/// 4. Every referenced field is in `defined_fields`.
///
/// `temperature` marks which writes trigger a property refresh.
pub fn validate_pipeline(
    stages: &[Box<dyn Subproblem>],
    defined_fields: &FieldSet,
    temperature: FieldId,
    dt: Option<f64>,
) -> Result<ExecutionPlan, PipelineError> {
    if let Some(dt) = dt {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PipelineError::InvalidDt { value: dt });
        }
    }

    if stages.is_empty() {
        return Err(PipelineError::EmptyPipeline);
    }

    {
        let mut last_writer: IndexMap<FieldId, usize> = IndexMap::new();
        let mut conflicts: Vec<WriteConflict> = Vec::new();
        for (i, stage) in stages.iter().enumerate() {
            for (field_id, _mode) in stage.writes() {
                if let Some(&j) = last_writer.get(&field_id) {
                    conflicts.push(WriteConflict {
                        field_id,
                        first_writer: stages[j].name().to_string(),
                        second_writer: stage.name().to_string(),
                    });
                }
                last_writer.insert(field_id, i);
            }
        }
        if !conflicts.is_empty() {
            return Err(PipelineError::WriteConflict(conflicts));
        }
    }

    for stage in stages {
        let reads = stage.reads();
        let reads_previous = stage.reads_previous();
        let written = stage.writes().into_iter().map(|(f, _)| f);
        let referenced = reads.iter().chain(reads_previous.iter()).chain(written);
        for field_id in referenced {
            if !defined_fields.contains(field_id) {
                return Err(PipelineError::UndefinedField {
                    stage: stage.name().to_string(),
                    field_id,
                });
            }
        }
    }

    let mut last_writer: IndexMap<FieldId, usize> = IndexMap::new();
    let mut routes = Vec::with_capacity(stages.len());
    let mut write_modes = Vec::with_capacity(stages.len());
    let mut refresh_after = Vec::with_capacity(stages.len());

    for (i, stage) in stages.iter().enumerate() {
        let stage_routes: IndexMap<FieldId, ReadSource> = stage
            .reads()
            .iter()
            .map(|field_id| {
                let source = match last_writer.get(&field_id) {
                    Some(&j) => ReadSource::Staged { writer_index: j },
                    None => ReadSource::Committed,
                };
                (field_id, source)
            })
            .collect();
        routes.push(stage_routes);

        let mut stage_modes = IndexMap::new();
        for (field_id, mode) in stage.writes() {
            stage_modes.insert(field_id, mode);
            last_writer.insert(field_id, i);
        }
        refresh_after.push(stage_modes.contains_key(&temperature));
        write_modes.push(stage_modes);
    }

    Ok(ExecutionPlan {
        routes,
        write_modes,
        refresh_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hytrap_core::SolveError;

    use crate::context::SolveContext;
    use crate::subproblem::SolveReport;

    const T: FieldId = FieldId(0);
    const C: FieldId = FieldId(1);
    const N: FieldId = FieldId(2);

    /// Declares its dependencies and does nothing.
    struct Stage {
        name: &'static str,
        reads: Vec<FieldId>,
        reads_previous: Vec<FieldId>,
        writes: Vec<(FieldId, WriteMode)>,
    }

    impl Subproblem for Stage {
        fn name(&self) -> &str {
            self.name
        }
        fn reads(&self) -> FieldSet {
            self.reads.iter().copied().collect()
        }
        fn reads_previous(&self) -> FieldSet {
            self.reads_previous.iter().copied().collect()
        }
        fn writes(&self) -> Vec<(FieldId, WriteMode)> {
            self.writes.clone()
        }
        fn solve(&self, _ctx: &mut SolveContext<'_>) -> Result<SolveReport, SolveError> {
            Ok(SolveReport::default())
        }
    }

    fn heat() -> Box<dyn Subproblem> {
        Box::new(Stage {
            name: "heat",
            reads: vec![T],
            reads_previous: vec![T],
            writes: vec![(T, WriteMode::Incremental)],
        })
    }

    fn transport() -> Box<dyn Subproblem> {
        Box::new(Stage {
            name: "transport",
            reads: vec![T, C, N],
            reads_previous: vec![C],
            writes: vec![(C, WriteMode::Incremental)],
        })
    }

    fn extrinsic() -> Box<dyn Subproblem> {
        Box::new(Stage {
            name: "extrinsic",
            reads: vec![C, T],
            reads_previous: vec![N],
            writes: vec![(N, WriteMode::Incremental)],
        })
    }

    fn all_fields() -> FieldSet {
        [T, C, N].into_iter().collect()
    }

    #[test]
    fn three_stage_routing() {
        let stages = vec![heat(), transport(), extrinsic()];
        let plan = validate_pipeline(&stages, &all_fields(), T, Some(0.1)).unwrap();
        assert_eq!(plan.len(), 3);

        assert_eq!(plan.source(0, T), Some(ReadSource::Committed));
        assert_eq!(plan.source(1, T), Some(ReadSource::Staged { writer_index: 0 }));
        assert_eq!(plan.source(1, C), Some(ReadSource::Committed));
        assert_eq!(plan.source(1, N), Some(ReadSource::Committed));
        assert_eq!(plan.source(2, C), Some(ReadSource::Staged { writer_index: 1 }));
    }

    #[test]
    fn only_temperature_writers_refresh_properties() {
        let stages = vec![heat(), transport(), extrinsic()];
        let plan = validate_pipeline(&stages, &all_fields(), T, Some(0.1)).unwrap();
        assert!(plan.refreshes_properties(0));
        assert!(!plan.refreshes_properties(1));
        assert!(!plan.refreshes_properties(2));
        assert!(!plan.refreshes_properties(9));
    }

    #[test]
    fn reads_previous_not_routed() {
        let stages = vec![extrinsic()];
        let plan = validate_pipeline(&stages, &all_fields(), T, None).unwrap();
        assert_eq!(plan.source(0, N), None);
        assert_eq!(plan.write_mode(0, N), Some(WriteMode::Incremental));
    }

    #[test]
    fn empty_pipeline_rejected() {
        let stages: Vec<Box<dyn Subproblem>> = vec![];
        assert!(matches!(
            validate_pipeline(&stages, &all_fields(), T, None),
            Err(PipelineError::EmptyPipeline)
        ));
    }

    #[test]
    fn write_conflict_detected() {
        let stages = vec![transport(), transport()];
        match validate_pipeline(&stages, &all_fields(), T, None) {
            Err(PipelineError::WriteConflict(conflicts)) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].field_id, C);
                assert_eq!(conflicts[0].first_writer, "transport");
            }
            other => panic!("expected WriteConflict, got {other:?}"),
        }
    }

    #[test]
    fn undefined_field_rejected() {
        let stages = vec![transport()];
        let fields: FieldSet = [T, C].into_iter().collect();
        assert_eq!(
            validate_pipeline(&stages, &fields, T, None).unwrap_err(),
            PipelineError::UndefinedField {
                stage: "transport".into(),
                field_id: N
            }
        );
    }

    #[test]
    fn undefined_previous_read_rejected() {
        let stages = vec![extrinsic()];
        let fields: FieldSet = [T, C].into_iter().collect();
        assert!(matches!(
            validate_pipeline(&stages, &fields, T, None),
            Err(PipelineError::UndefinedField { field_id: N, .. })
        ));
    }

    #[test]
    fn invalid_dt_rejected() {
        let stages = vec![heat()];
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                validate_pipeline(&stages, &all_fields(), T, Some(dt)),
                Err(PipelineError::InvalidDt { .. })
            ));
        }
    }

    #[test]
    fn stationary_pipeline_needs_no_dt() {
        let stages = vec![transport()];
        assert!(validate_pipeline(&stages, &all_fields(), T, None).is_ok());
    }
}
