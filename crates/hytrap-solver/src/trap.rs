//! Trap definitions.

use hytrap_core::FieldId;
use hytrap_expr::ExpressionId;
use hytrap_materials::arrhenius;
use smallvec::SmallVec;

/// Where a trap's site density comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum TrapKind {
    /// A fixed expression of space and time.
    Intrinsic {
        /// Registered density expression.
        density: ExpressionId,
    },
    /// A field advanced by its own ODE every step.
    Extrinsic {
        /// The density field.
        field: FieldId,
    },
}

/// One trap: rate constants, the materials it lives in, and its density.
///
/// Trapping rate is `k_0 exp(-E_k / k_B T)` and detrapping rate
/// `p_0 exp(-E_p / k_B T)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrapSpec {
    /// Trapping rate pre-factor, m^3/s.
    pub k_0: f64,
    /// Trapping activation energy, eV.
    pub e_k: f64,
    /// Detrapping rate pre-factor, 1/s.
    pub p_0: f64,
    /// Detrapping activation energy, eV.
    pub e_p: f64,
    /// Volume markers the trap exists in.
    pub materials: SmallVec<[u32; 4]>,
    /// Density source.
    pub kind: TrapKind,
}

impl TrapSpec {
    /// Trapping rate at temperature `t`.
    pub fn trapping_rate(&self, t: f64) -> f64 {
        arrhenius(self.k_0, self.e_k, t)
    }

    /// Detrapping rate at temperature `t`.
    pub fn detrapping_rate(&self, t: f64) -> f64 {
        arrhenius(self.p_0, self.e_p, t)
    }

    /// Whether the trap exists in cells with this volume marker.
    pub fn is_active_in(&self, marker: u32) -> bool {
        self.materials.contains(&marker)
    }
}
