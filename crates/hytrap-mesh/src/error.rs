//! Error types for mesh construction.

use std::fmt;

/// Errors arising from mesh construction or marking.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Attempted to construct a mesh with zero cells.
    EmptyMesh,
    /// Vertices are not strictly increasing.
    NonMonotonicVertices {
        /// Index of the first vertex that is not greater than its predecessor.
        index: usize,
    },
    /// A size or count parameter is out of range.
    InvalidDimension {
        /// Parameter name.
        name: &'static str,
        /// The offending value.
        value: f64,
    },
    /// A local refinement request cannot be satisfied.
    InvalidRefinement {
        /// What went wrong.
        reason: String,
    },
    /// A marker vector does not match the cell count.
    MarkerCountMismatch {
        /// Number of cells in the mesh.
        expected: usize,
        /// Number of markers supplied.
        actual: usize,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMesh => write!(f, "mesh must have at least one cell"),
            Self::NonMonotonicVertices { index } => {
                write!(f, "vertex {index} is not greater than the previous vertex")
            }
            Self::InvalidDimension { name, value } => {
                write!(f, "{name} must be finite and positive, got {value}")
            }
            Self::InvalidRefinement { reason } => write!(f, "invalid refinement: {reason}"),
            Self::MarkerCountMismatch { expected, actual } => {
                write!(f, "expected {expected} volume markers, got {actual}")
            }
        }
    }
}

impl std::error::Error for MeshError {}
