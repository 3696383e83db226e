//! Strongly-typed identifiers and the [`Point`] type alias.

use std::fmt;

/// Identifies a field in the simulation's field layout.
///
/// `FieldId(n)` corresponds to the n-th [`FieldDef`](crate::FieldDef)
/// registered at setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FieldId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Number of completed time steps.
///
/// Step 0 is the initial state; a transient run increments it once per
/// committed step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepIndex(pub u64);

impl StepIndex {
    /// The index following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepIndex {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// A position in physical space.
///
/// Always three components; unused dimensions are zero, so 1D and 2D
/// meshes share one representation with 3D expressions.
pub type Point = [f64; 3];
