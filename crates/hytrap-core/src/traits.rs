//! Field access traits used by solver stages and post-processing.

use crate::id::FieldId;

/// Read-only access to field data.
///
/// Returns `None` if the field is not readable in the current context,
/// either because it does not exist or because the caller did not
/// declare it.
pub trait FieldReader {
    /// Read the data for a field as a flat `f64` slice.
    ///
    /// Vector fields are stored cell-major: component `k` of cell `i`
    /// lives at `i * dims + k`.
    fn read(&self, field: FieldId) -> Option<&[f64]>;
}

/// Mutable access to field data.
///
/// Returns `None` if the field is not writable in the current context.
pub trait FieldWriter {
    /// Get a mutable slice for writing field data.
    fn write(&mut self, field: FieldId) -> Option<&mut [f64]>;
}
