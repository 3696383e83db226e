//! Test utilities and mock types for hytrap development.
//!
//! Provides mock implementations of the field access traits
//! ([`FieldReader`], [`FieldWriter`]) and a set of fixture subproblems
//! in [`fixtures`] for pipeline and engine tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashMap;

use hytrap_core::{FieldId, FieldReader, FieldWriter};

pub use fixtures::{ConstStage, CopyStage, CountingStage, FailingStage};

/// Mock implementation of [`FieldReader`].
///
/// Backed by a `HashMap<FieldId, Vec<f64>>`. Pre-populate fields with
/// [`set_field`](MockFieldReader::set_field) before passing to code
/// under test.
#[derive(Default)]
pub struct MockFieldReader {
    fields: HashMap<FieldId, Vec<f64>>,
}

impl MockFieldReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a field with data for testing.
    pub fn set_field(&mut self, field: FieldId, data: Vec<f64>) {
        self.fields.insert(field, data);
    }

    pub fn get_field(&self, field: FieldId) -> Option<&[f64]> {
        self.fields.get(&field).map(|v| v.as_slice())
    }
}

impl FieldReader for MockFieldReader {
    fn read(&self, field: FieldId) -> Option<&[f64]> {
        self.get_field(field)
    }
}

/// Mock implementation of [`FieldWriter`].
///
/// Pre-allocate buffers with [`add_field`](MockFieldWriter::add_field)
/// or seed them with [`set_field`](MockFieldWriter::set_field), pass to
/// code under test, then inspect with
/// [`get_field`](MockFieldWriter::get_field).
#[derive(Default)]
pub struct MockFieldWriter {
    fields: HashMap<FieldId, Vec<f64>>,
}

impl MockFieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate a zeroed field buffer.
    pub fn add_field(&mut self, field: FieldId, size: usize) {
        self.fields.insert(field, vec![0.0; size]);
    }

    /// Seed a field buffer, as an incremental write would be.
    pub fn set_field(&mut self, field: FieldId, data: Vec<f64>) {
        self.fields.insert(field, data);
    }

    /// Read back the current field data for test assertions.
    pub fn get_field(&self, field: FieldId) -> Option<&[f64]> {
        self.fields.get(&field).map(|v| v.as_slice())
    }
}

impl FieldWriter for MockFieldWriter {
    fn write(&mut self, field: FieldId) -> Option<&mut [f64]> {
        self.fields.get_mut(&field).map(|v| v.as_mut_slice())
    }
}
