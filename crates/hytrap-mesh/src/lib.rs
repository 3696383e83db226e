//! Meshes for hytrap simulations.
//!
//! This crate defines the [`Mesh`] trait, the cell/face view of space
//! that every solver stage and post-processor works through, along with
//! two structured backends.
//!
//! # Backends
//!
//! - [`IntervalMesh`]: 1D, from explicit vertices or a locally refined
//!   uniform grid. Surfaces: 1 = left, 2 = right.
//! - [`RectangleMesh`]: 2D structured rectangle. Surfaces: 1 = left,
//!   2 = right, 3 = bottom, 4 = top.
//!
//! Volume markers identify material subdomains. Both backends start with
//! every cell marked `1` and are re-marked after construction with
//! `mark_volumes`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod interval;
pub mod mesh;
pub mod rectangle;

#[cfg(test)]
pub(crate) mod compliance;

pub use error::MeshError;
pub use interval::{IntervalMesh, Refinement};
pub use mesh::{BoundaryFace, InteriorFace, Mesh};
pub use rectangle::RectangleMesh;
