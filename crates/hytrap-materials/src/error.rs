//! Errors raised while building a material table.

use std::error::Error;
use std::fmt;

/// Errors from [`MaterialTable`](crate::MaterialTable) construction or
/// refresh.
#[derive(Clone, Debug, PartialEq)]
pub enum MaterialError {
    /// No materials were supplied.
    NoMaterials,
    /// Two materials claim the same volume marker.
    DuplicateId {
        /// The contested marker.
        id: u32,
    },
    /// A cell carries a volume marker no material covers.
    UnknownVolumeMarker {
        /// Offending cell.
        cell: usize,
        /// Its marker.
        marker: u32,
    },
    /// Some materials define a solubility and others do not.
    MixedChemicalPotential {
        /// Material ids lacking `S_0`.
        missing: Vec<u32>,
    },
    /// A temperature field of the wrong length was passed to refresh.
    TemperatureSizeMismatch {
        /// Number of cells.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
}

impl fmt::Display for MaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMaterials => write!(f, "no materials defined"),
            Self::DuplicateId { id } => {
                write!(f, "volume marker {id} is claimed by more than one material")
            }
            Self::UnknownVolumeMarker { cell, marker } => {
                write!(f, "cell {cell} has volume marker {marker} with no material")
            }
            Self::MixedChemicalPotential { missing } => write!(
                f,
                "chemical potential requires S_0 on every material; missing on {missing:?}"
            ),
            Self::TemperatureSizeMismatch { expected, actual } => write!(
                f,
                "temperature field has {actual} values, mesh has {expected} cells"
            ),
        }
    }
}

impl Error for MaterialError {}
