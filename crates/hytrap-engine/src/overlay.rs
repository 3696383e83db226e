//! Per-stage read routing.
//!
//! Within a step, transport must see the temperature the heat stage just
//! wrote, while the heat stage itself reads the committed temperature of
//! the last step. The [`ExecutionPlan`](hytrap_solver::ExecutionPlan)
//! records which of the two each `(stage, field)` read resolves to.
//!
//! Staged inputs are copied out of staging before the stage runs, which
//! frees the staging area for the stage's own writer.

use hytrap_core::{FieldId, FieldReader};
use hytrap_solver::ReadSource;
use indexmap::IndexMap;

/// Copies of the staged fields one stage reads.
pub(crate) struct StagedFieldCache {
    // `None` marks a slot left over from an earlier stage.
    entries: IndexMap<FieldId, Option<Vec<f64>>>,
}

impl StagedFieldCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Replace the cache contents with every `Staged` route of one stage,
    /// read from `staging`. Buffers are reused across stages and steps.
    pub(crate) fn refill(&mut self, routes: &IndexMap<FieldId, ReadSource>, staging: &dyn FieldReader) {
        for slot in self.entries.values_mut() {
            *slot = None;
        }
        for (&field, source) in routes {
            if !matches!(source, ReadSource::Staged { .. }) {
                continue;
            }
            if let Some(data) = staging.read(field) {
                let buf = self
                    .entries
                    .entry(field)
                    .or_insert(None)
                    .get_or_insert_with(|| Vec::with_capacity(data.len()));
                buf.clear();
                buf.extend_from_slice(data);
            }
        }
    }
}

impl FieldReader for StagedFieldCache {
    fn read(&self, field: FieldId) -> Option<&[f64]> {
        self.entries.get(&field)?.as_deref()
    }
}

/// What a stage sees through [`SolveContext::read`](hytrap_solver::SolveContext).
///
/// Fields the stage did not declare read as `None`, even when they exist.
pub(crate) struct OverlayReader<'a> {
    routes: &'a IndexMap<FieldId, ReadSource>,
    committed: &'a dyn FieldReader,
    staged: &'a StagedFieldCache,
}

impl<'a> OverlayReader<'a> {
    pub(crate) fn new(
        routes: &'a IndexMap<FieldId, ReadSource>,
        committed: &'a dyn FieldReader,
        staged: &'a StagedFieldCache,
    ) -> Self {
        Self {
            routes,
            committed,
            staged,
        }
    }
}

impl FieldReader for OverlayReader<'_> {
    fn read(&self, field: FieldId) -> Option<&[f64]> {
        match self.routes.get(&field)? {
            ReadSource::Committed => self.committed.read(field),
            ReadSource::Staged { .. } => self.staged.read(field),
        }
    }
}
