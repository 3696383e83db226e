//! Material property laws for hytrap.
//!
//! A [`Material`] describes one volume subdomain. A [`MaterialTable`]
//! maps every mesh cell to its material and turns a temperature field
//! into an immutable [`PropertySnapshot`] that the solver stages read.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod law;
pub mod material;
pub mod table;

pub use error::MaterialError;
pub use law::{arrhenius, PropertyLaw, K_B};
pub use material::{one_or_many, Enthalpy, Material, MaterialIds};
pub use table::{MaterialTable, PropertySnapshot};
