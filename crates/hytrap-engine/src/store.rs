//! Committed and staged field generations.
//!
//! The store holds one committed buffer per field (the end of the last
//! successful step) and a staging area for the step in progress. Stages
//! write only into staging; [`commit`](FieldStore::commit) promotes the
//! staged buffers and [`rollback`](FieldStore::rollback) discards them,
//! so "previous" is never partially updated.

use hytrap_core::{FieldId, FieldReader, FieldWriter, SolveError};
use hytrap_solver::WriteMode;
use indexmap::IndexMap;

// ── Generation ─────────────────────────────────────────────────────

/// Committed field buffers, indexed by field id.
#[derive(Clone, Debug, Default)]
pub(crate) struct Generation {
    fields: Vec<Vec<f64>>,
}

impl FieldReader for Generation {
    fn read(&self, field: FieldId) -> Option<&[f64]> {
        self.fields.get(field.0 as usize).map(|v| v.as_slice())
    }
}

// ── StagedFields ───────────────────────────────────────────────────

/// Buffers written during the current step.
#[derive(Debug, Default)]
pub(crate) struct StagedFields {
    entries: IndexMap<FieldId, Vec<f64>>,
}

impl StagedFields {
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FieldReader for StagedFields {
    fn read(&self, field: FieldId) -> Option<&[f64]> {
        self.entries.get(&field).map(|v| v.as_slice())
    }
}

/// [`FieldWriter`] restricted to one stage's declared outputs.
pub(crate) struct StageWriter<'a> {
    staged: &'a mut StagedFields,
    allowed: &'a IndexMap<FieldId, WriteMode>,
}

impl<'a> StageWriter<'a> {
    pub(crate) fn new(
        staged: &'a mut StagedFields,
        allowed: &'a IndexMap<FieldId, WriteMode>,
    ) -> Self {
        Self { staged, allowed }
    }
}

impl FieldWriter for StageWriter<'_> {
    fn write(&mut self, field: FieldId) -> Option<&mut [f64]> {
        if !self.allowed.contains_key(&field) {
            return None;
        }
        self.staged.entries.get_mut(&field).map(|v| v.as_mut_slice())
    }
}

// ── CurrentFields ──────────────────────────────────────────────────

/// The latest value of every field: staged if written this step,
/// committed otherwise.
pub struct CurrentFields<'a> {
    committed: &'a Generation,
    staged: &'a StagedFields,
}

impl FieldReader for CurrentFields<'_> {
    fn read(&self, field: FieldId) -> Option<&[f64]> {
        self.staged
            .read(field)
            .or_else(|| self.committed.read(field))
    }
}

// ── FieldStore ─────────────────────────────────────────────────────

/// Two-generation field storage.
#[derive(Debug)]
pub(crate) struct FieldStore {
    committed: Generation,
    staged: StagedFields,
    commits: u64,
}

impl FieldStore {
    /// Create a store whose committed generation is `initial`.
    pub(crate) fn new(initial: Vec<Vec<f64>>) -> Self {
        Self {
            committed: Generation { fields: initial },
            staged: StagedFields::default(),
            commits: 0,
        }
    }

    /// Number of successful commits.
    pub(crate) fn commit_count(&self) -> u64 {
        self.commits
    }

    pub(crate) fn committed(&self) -> &Generation {
        &self.committed
    }

    pub(crate) fn current(&self) -> CurrentFields<'_> {
        CurrentFields {
            committed: &self.committed,
            staged: &self.staged,
        }
    }

    /// Split borrow: committed for reads, staging for writes.
    pub(crate) fn parts_mut(&mut self) -> (&Generation, &mut StagedFields) {
        (&self.committed, &mut self.staged)
    }

    /// Allocate the staging buffer for `field`.
    ///
    /// `Full` zero-fills; `Incremental` seeds from the committed value.
    pub(crate) fn prepare(&mut self, field: FieldId, mode: WriteMode) -> Result<(), SolveError> {
        let committed = self
            .committed
            .read(field)
            .ok_or(SolveError::FieldUnavailable { field })?;
        let buf = self.staged.entries.entry(field).or_default();
        buf.clear();
        match mode {
            WriteMode::Full => buf.resize(committed.len(), 0.0),
            WriteMode::Incremental => buf.extend_from_slice(committed),
        }
        Ok(())
    }

    /// Promote every staged buffer into the committed generation.
    pub(crate) fn commit(&mut self) {
        for (field, data) in self.staged.entries.drain(..) {
            if let Some(slot) = self.committed.fields.get_mut(field.0 as usize) {
                *slot = data;
            }
        }
        self.commits += 1;
    }

    /// Discard the staged buffers.
    pub(crate) fn rollback(&mut self) {
        self.staged.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FieldStore {
        FieldStore::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]])
    }

    #[test]
    fn full_mode_zeroes_incremental_mode_seeds() {
        let mut s = store();
        s.prepare(FieldId(0), WriteMode::Full).unwrap();
        s.prepare(FieldId(1), WriteMode::Incremental).unwrap();
        assert_eq!(s.staged.read(FieldId(0)), Some(&[0.0, 0.0][..]));
        assert_eq!(s.staged.read(FieldId(1)), Some(&[3.0, 4.0][..]));
    }

    #[test]
    fn current_prefers_staged_over_committed() {
        let mut s = store();
        s.prepare(FieldId(0), WriteMode::Full).unwrap();
        assert_eq!(s.current().read(FieldId(0)), Some(&[0.0, 0.0][..]));
        assert_eq!(s.current().read(FieldId(1)), Some(&[3.0, 4.0][..]));
        assert_eq!(s.committed().read(FieldId(0)), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn commit_promotes_and_clears_staging() {
        let mut s = store();
        s.prepare(FieldId(1), WriteMode::Full).unwrap();
        let allowed: IndexMap<FieldId, WriteMode> =
            [(FieldId(1), WriteMode::Full)].into_iter().collect();
        {
            let (_, staged) = s.parts_mut();
            let mut writer = StageWriter::new(staged, &allowed);
            writer.write(FieldId(1)).unwrap().copy_from_slice(&[9.0, 8.0]);
        }
        s.commit();
        assert!(s.staged.is_empty());
        assert_eq!(s.commit_count(), 1);
        assert_eq!(s.committed().read(FieldId(1)), Some(&[9.0, 8.0][..]));
    }

    #[test]
    fn rollback_leaves_committed_untouched() {
        let mut s = store();
        s.prepare(FieldId(0), WriteMode::Full).unwrap();
        s.rollback();
        assert!(s.staged.is_empty());
        assert_eq!(s.commit_count(), 0);
        assert_eq!(s.current().read(FieldId(0)), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn writer_rejects_undeclared_fields() {
        let mut s = store();
        s.prepare(FieldId(0), WriteMode::Full).unwrap();
        s.prepare(FieldId(1), WriteMode::Full).unwrap();
        let allowed: IndexMap<FieldId, WriteMode> =
            [(FieldId(0), WriteMode::Full)].into_iter().collect();
        let (_, staged) = s.parts_mut();
        let mut writer = StageWriter::new(staged, &allowed);
        assert!(writer.write(FieldId(0)).is_some());
        assert!(writer.write(FieldId(1)).is_none());
    }

    #[test]
    fn prepare_unknown_field_fails() {
        let mut s = store();
        assert!(matches!(
            s.prepare(FieldId(5), WriteMode::Full),
            Err(SolveError::FieldUnavailable { field: FieldId(5) })
        ));
    }
}
