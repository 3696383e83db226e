//! Field snapshot exports.
//!
//! [`FieldExport`] is a post-processor that samples selected solution
//! fields every `n` steps (or only at the final step) and hands them to
//! a [`SnapshotWriter`]. [`CsvSnapshotWriter`] buffers the series in
//! memory and writes one CSV per label when the run finishes, so a
//! write failure never leaves a step half-exported.

use std::path::PathBuf;

use indexmap::IndexMap;
use log::debug;

use crate::export::{write_csv, ExportError};
use crate::output::SolutionField;
use crate::postprocess::{PostProcessError, PostProcessor, StepView};

/// Sink for per-cell field snapshots.
pub trait SnapshotWriter: Send {
    /// Record `values` of the series `label` at `time`.
    fn write(&mut self, label: &str, time: f64, values: &[f64]) -> Result<(), ExportError>;

    /// Flush everything recorded.
    fn finish(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Writes `{folder}/{label}.csv` with header `t(s),cell_0,..` and one
/// row per export time.
pub struct CsvSnapshotWriter {
    folder: PathBuf,
    series: IndexMap<String, Vec<Vec<f64>>>,
}

impl CsvSnapshotWriter {
    /// A writer targeting `folder`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            series: IndexMap::new(),
        }
    }
}

impl SnapshotWriter for CsvSnapshotWriter {
    fn write(&mut self, label: &str, time: f64, values: &[f64]) -> Result<(), ExportError> {
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(time);
        row.extend_from_slice(values);
        self.series.entry(label.to_string()).or_default().push(row);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        for (label, rows) in self.series.drain(..) {
            let cells = rows.first().map_or(0, |r| r.len().saturating_sub(1));
            let header: Vec<String> = std::iter::once("t(s)".to_string())
                .chain((0..cells).map(|c| format!("cell_{c}")))
                .collect();
            let path = self.folder.join(format!("{label}.csv"));
            write_csv(&path, &header, &rows)?;
            debug!("wrote {} snapshots to {}", rows.len(), path.display());
        }
        Ok(())
    }
}

/// Periodic export of solution fields.
pub struct FieldExport {
    fields: Vec<(SolutionField, String)>,
    every: usize,
    last_step_only: bool,
    steps_seen: usize,
    writer: Box<dyn SnapshotWriter>,
}

impl FieldExport {
    /// Export each `(field, label)` every `every` steps, or only at the
    /// final step when `last_step_only`. `every` is clamped to at least 1.
    pub fn new(
        fields: Vec<(SolutionField, String)>,
        every: usize,
        last_step_only: bool,
        writer: Box<dyn SnapshotWriter>,
    ) -> Self {
        Self {
            fields,
            every: every.max(1),
            last_step_only,
            steps_seen: 0,
            writer,
        }
    }
}

impl PostProcessor for FieldExport {
    fn name(&self) -> &str {
        "field_export"
    }

    fn process(&mut self, view: &StepView<'_>) -> Result<Option<Vec<f64>>, PostProcessError> {
        self.steps_seen += 1;
        let due = if self.last_step_only {
            view.final_step
        } else {
            self.steps_seen % self.every == 0
        };
        if !due {
            return Ok(None);
        }
        for (field, label) in &self.fields {
            let values = field.values(view.fields, view.layout, view.properties)?;
            self.writer.write(label, view.step.time, &values)?;
        }
        Ok(None)
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.writer.finish()
    }
}
