//! Boundary conditions for the transport and heat equations.
//!
//! Every condition is expressed as an outflow through one boundary face
//! together with its derivative with respect to the adjacent cell's
//! unknown. Assembly adds the outflow to the cell's residual; the surface
//! flux post-processor sums the same outflow, so reported fluxes are
//! consistent with the discrete balance.

use hytrap_expr::{ExpressionClock, ExpressionId};
use hytrap_materials::{arrhenius, MaterialTable, PropertySnapshot};
use hytrap_mesh::{BoundaryFace, Mesh};
use smallvec::SmallVec;

/// State of the cell adjacent to a boundary face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceState {
    /// Unknown of the cell: mobile concentration, divided by solubility
    /// under chemical potential.
    pub u: f64,
    /// Solubility of the cell, `1.0` without chemical potential.
    pub solubility: f64,
    /// Diffusivity of the cell.
    pub diffusivity: f64,
    /// Temperature of the cell.
    pub temperature: f64,
}

impl FaceState {
    /// Physical mobile concentration.
    pub fn concentration(&self) -> f64 {
        self.solubility * self.u
    }
}

/// Kinds of hydrogen transport boundary condition.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportBcKind {
    /// Imposed mobile concentration (`"dc"`).
    Dirichlet {
        /// Surface concentration.
        value: ExpressionId,
    },
    /// Sieverts' law, `S_0 exp(-E_S / k_B T) sqrt(pressure)` (`"solubility"`).
    Solubility {
        /// Gas pressure, Pa.
        pressure: ExpressionId,
        /// Solubility pre-factor.
        s_0: f64,
        /// Solubility activation energy, eV.
        e_s: f64,
    },
    /// Imposed inward particle flux (`"flux"`).
    Flux {
        /// Flux into the domain.
        value: ExpressionId,
    },
    /// Second-order recombination, outflow `Kr c^2` (`"recomb"`).
    Recombination {
        /// Recombination pre-factor.
        kr_0: f64,
        /// Recombination activation energy, eV.
        e_kr: f64,
    },
}

/// A transport boundary condition on one or more surfaces.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportBc {
    /// Surface markers it applies to.
    pub surfaces: SmallVec<[u32; 4]>,
    /// What it imposes.
    pub kind: TransportBcKind,
}

impl TransportBc {
    /// Whether this condition acts on `surface`.
    pub fn applies_to(&self, surface: u32) -> bool {
        self.surfaces.contains(&surface)
    }

    /// Outflow of mobile particles through `face` and its derivative with
    /// respect to the cell unknown `u`.
    pub fn outflow(
        &self,
        face: &BoundaryFace,
        state: &FaceState,
        clock: &ExpressionClock,
    ) -> (f64, f64) {
        let conductance = face.area * state.diffusivity / face.distance;
        match &self.kind {
            TransportBcKind::Dirichlet { value } => {
                let c_b = clock.evaluate(*value, &face.centroid);
                (
                    conductance * (state.concentration() - c_b),
                    conductance * state.solubility,
                )
            }
            TransportBcKind::Solubility { pressure, s_0, e_s } => {
                let p = clock.evaluate(*pressure, &face.centroid);
                let c_b = arrhenius(*s_0, *e_s, state.temperature) * p.max(0.0).sqrt();
                (
                    conductance * (state.concentration() - c_b),
                    conductance * state.solubility,
                )
            }
            TransportBcKind::Flux { value } => {
                (-face.area * clock.evaluate(*value, &face.centroid), 0.0)
            }
            TransportBcKind::Recombination { kr_0, e_kr } => {
                let kr = arrhenius(*kr_0, *e_kr, state.temperature);
                let c = state.concentration();
                (
                    face.area * kr * c * c,
                    2.0 * face.area * kr * c * state.solubility,
                )
            }
        }
    }
}

/// Kinds of heat boundary condition.
#[derive(Clone, Debug, PartialEq)]
pub enum HeatBcKind {
    /// Imposed temperature (`"dc"`).
    Dirichlet {
        /// Surface temperature.
        value: ExpressionId,
    },
    /// Imposed inward heat flux (`"flux"`).
    Flux {
        /// Heat flux into the domain, W/m^2.
        value: ExpressionId,
    },
    /// Convective exchange `h (T - T_ext)` (`"convective_flux"`).
    Convective {
        /// Heat transfer coefficient.
        h_coeff: ExpressionId,
        /// External temperature.
        t_ext: ExpressionId,
    },
}

/// A heat boundary condition on one or more surfaces.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatBc {
    /// Surface markers it applies to.
    pub surfaces: SmallVec<[u32; 4]>,
    /// What it imposes.
    pub kind: HeatBcKind,
}

impl HeatBc {
    /// Whether this condition acts on `surface`.
    pub fn applies_to(&self, surface: u32) -> bool {
        self.surfaces.contains(&surface)
    }

    /// Heat outflow through `face` for cell temperature `t`, and its
    /// derivative with respect to `t`. `k` and `dk` are the cell's
    /// conductivity and its temperature derivative.
    pub fn outflow(
        &self,
        face: &BoundaryFace,
        t: f64,
        k: f64,
        dk: f64,
        clock: &ExpressionClock,
    ) -> (f64, f64) {
        match &self.kind {
            HeatBcKind::Dirichlet { value } => {
                let t_b = clock.evaluate(*value, &face.centroid);
                let g = face.area / face.distance;
                (g * k * (t - t_b), g * (k + dk * (t - t_b)))
            }
            HeatBcKind::Flux { value } => {
                (-face.area * clock.evaluate(*value, &face.centroid), 0.0)
            }
            HeatBcKind::Convective { h_coeff, t_ext } => {
                let h = clock.evaluate(*h_coeff, &face.centroid);
                let t_e = clock.evaluate(*t_ext, &face.centroid);
                (face.area * h * (t - t_e), face.area * h)
            }
        }
    }
}

/// Total mobile-particle outflow through `surface`, positive when
/// particles leave the domain.
///
/// `concentration` is the cell-major concentration field with
/// `components` values per cell. Surfaces without a condition are
/// impermeable and report zero.
#[allow(clippy::too_many_arguments)]
pub fn transport_surface_outflow(
    bcs: &[TransportBc],
    mesh: &dyn Mesh,
    surface: u32,
    concentration: &[f64],
    components: usize,
    temperature: &[f64],
    properties: &PropertySnapshot,
    clock: &ExpressionClock,
) -> f64 {
    mesh.boundary_faces()
        .iter()
        .filter(|face| face.surface == surface)
        .map(|face| {
            let c = face.cell;
            let state = FaceState {
                u: concentration[c * components],
                solubility: properties.solubility_or_one(c),
                diffusivity: properties.diffusivity[c],
                temperature: temperature[c],
            };
            bcs.iter()
                .filter(|bc| bc.applies_to(surface))
                .map(|bc| bc.outflow(face, &state, clock).0)
                .sum::<f64>()
        })
        .sum()
}

/// Total heat outflow through `surface`, positive when heat leaves.
pub fn heat_surface_outflow(
    bcs: &[HeatBc],
    mesh: &dyn Mesh,
    surface: u32,
    temperature: &[f64],
    materials: &MaterialTable,
    clock: &ExpressionClock,
) -> f64 {
    mesh.boundary_faces()
        .iter()
        .filter(|face| face.surface == surface)
        .map(|face| {
            let t = temperature[face.cell];
            let (k, dk) = materials.thermal_conductivity_at(face.cell, t);
            bcs.iter()
                .filter(|bc| bc.applies_to(surface))
                .map(|bc| bc.outflow(face, t, k, dk, clock).0)
                .sum::<f64>()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hytrap_expr::Expression;

    fn face() -> BoundaryFace {
        BoundaryFace {
            cell: 0,
            area: 2.0,
            distance: 0.5,
            surface: 1,
            centroid: [0.0; 3],
        }
    }

    fn state(u: f64) -> FaceState {
        FaceState {
            u,
            solubility: 1.0,
            diffusivity: 3.0,
            temperature: 400.0,
        }
    }

    fn surfaces() -> SmallVec<[u32; 4]> {
        SmallVec::from_slice(&[1])
    }

    #[test]
    fn dirichlet_outflow_is_conductance_times_jump() {
        let mut clock = ExpressionClock::new();
        let value = clock.register("dc", Expression::constant(1.0));
        let bc = TransportBc {
            surfaces: surfaces(),
            kind: TransportBcKind::Dirichlet { value },
        };
        let (q, dq) = bc.outflow(&face(), &state(4.0), &clock);
        // g = 2 * 3 / 0.5 = 12
        assert_relative_eq!(q, 36.0);
        assert_relative_eq!(dq, 12.0);
    }

    #[test]
    fn flux_is_inward() {
        let mut clock = ExpressionClock::new();
        let value = clock.register("flux", Expression::transient(|_, t| t));
        clock.advance_to(5.0);
        let bc = TransportBc {
            surfaces: surfaces(),
            kind: TransportBcKind::Flux { value },
        };
        assert_eq!(bc.outflow(&face(), &state(0.0), &clock), (-10.0, 0.0));
    }

    #[test]
    fn recombination_derivative_matches_finite_difference() {
        let clock = ExpressionClock::new();
        let bc = TransportBc {
            surfaces: surfaces(),
            kind: TransportBcKind::Recombination {
                kr_0: 1e-2,
                e_kr: 0.1,
            },
        };
        let mut s = state(3.0);
        s.solubility = 2.0;
        let (_, dq) = bc.outflow(&face(), &s, &clock);
        let h = 1e-6;
        let up = bc.outflow(&face(), &state_with(3.0 + h, 2.0), &clock).0;
        let down = bc.outflow(&face(), &state_with(3.0 - h, 2.0), &clock).0;
        assert_relative_eq!(dq, (up - down) / (2.0 * h), max_relative = 1e-6);
    }

    fn state_with(u: f64, solubility: f64) -> FaceState {
        FaceState {
            solubility,
            ..state(u)
        }
    }

    #[test]
    fn sieverts_law_uses_square_root_of_pressure() {
        let mut clock = ExpressionClock::new();
        let pressure = clock.register("p", Expression::constant(4.0));
        let bc = TransportBc {
            surfaces: surfaces(),
            kind: TransportBcKind::Solubility {
                pressure,
                s_0: 5.0,
                e_s: 0.0,
            },
        };
        // c_b = 5 * 2 = 10, so zero outflow at u = 10.
        assert_relative_eq!(bc.outflow(&face(), &state(10.0), &clock).0, 0.0);
    }

    #[test]
    fn convective_heat_outflow() {
        let mut clock = ExpressionClock::new();
        let h_coeff = clock.register("h", Expression::constant(10.0));
        let t_ext = clock.register("t_ext", Expression::constant(300.0));
        let bc = HeatBc {
            surfaces: surfaces(),
            kind: HeatBcKind::Convective { h_coeff, t_ext },
        };
        assert!(bc.applies_to(1));
        assert!(!bc.applies_to(2));
        assert_eq!(bc.outflow(&face(), 350.0, 1.0, 0.0, &clock), (1000.0, 20.0));
    }

    #[test]
    fn heat_dirichlet_accounts_for_conductivity_derivative() {
        let mut clock = ExpressionClock::new();
        let value = clock.register("T_b", Expression::constant(300.0));
        let bc = HeatBc {
            surfaces: surfaces(),
            kind: HeatBcKind::Dirichlet { value },
        };
        let (q, dq) = bc.outflow(&face(), 310.0, 2.0, 0.1, &clock);
        assert_relative_eq!(q, 4.0 * 2.0 * 10.0);
        assert_relative_eq!(dq, 4.0 * (2.0 + 0.1 * 10.0));
    }
}
