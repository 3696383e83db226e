//! Material definitions.

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

use crate::law::{arrhenius, PropertyLaw};

/// Volume markers a material applies to. Configuration may give a single
/// id or a list.
pub type MaterialIds = SmallVec<[u32; 4]>;

/// Heat of transport `H = free_enthalpy + entropy * T`, used by the Soret
/// term.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Enthalpy {
    /// Temperature-independent part, in eV.
    pub free_enthalpy: f64,
    /// Coefficient of `T`, in eV/K.
    pub entropy: f64,
}

impl Enthalpy {
    /// Value at temperature `t`.
    pub fn value(&self, t: f64) -> f64 {
        self.free_enthalpy + self.entropy * t
    }
}

/// One volume subdomain's properties.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Material {
    /// Volume markers covered by this material.
    #[serde(deserialize_with = "one_or_many")]
    pub id: MaterialIds,
    /// Diffusivity pre-factor, m^2/s.
    #[serde(rename = "D_0")]
    pub d_0: f64,
    /// Diffusion activation energy, eV.
    #[serde(rename = "E_D")]
    pub e_d: f64,
    /// Solubility pre-factor. Its presence on every material enables the
    /// chemical-potential formulation.
    #[serde(rename = "S_0", default, skip_serializing_if = "Option::is_none")]
    pub s_0: Option<f64>,
    /// Solubility activation energy, eV.
    #[serde(rename = "E_S", default, skip_serializing_if = "Option::is_none")]
    pub e_s: Option<f64>,
    /// Thermal conductivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermal_cond: Option<PropertyLaw>,
    /// Specific heat capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_capacity: Option<PropertyLaw>,
    /// Mass density.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rho: Option<PropertyLaw>,
    /// Heat of transport for the Soret effect.
    #[serde(rename = "H", default, skip_serializing_if = "Option::is_none")]
    pub heat_of_transport: Option<Enthalpy>,
    /// `[x_min, x_max]` extent along x used to mark 1D and 2D meshes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borders: Option<[f64; 2]>,
}

impl Material {
    /// A material with diffusivity only.
    pub fn new(id: u32, d_0: f64, e_d: f64) -> Self {
        Self {
            id: SmallVec::from_slice(&[id]),
            d_0,
            e_d,
            s_0: None,
            e_s: None,
            thermal_cond: None,
            heat_capacity: None,
            rho: None,
            heat_of_transport: None,
            borders: None,
        }
    }

    /// Set the solubility law.
    pub fn with_solubility(mut self, s_0: f64, e_s: f64) -> Self {
        self.s_0 = Some(s_0);
        self.e_s = Some(e_s);
        self
    }

    /// Set the thermal properties.
    pub fn with_thermal(
        mut self,
        thermal_cond: PropertyLaw,
        heat_capacity: PropertyLaw,
        rho: PropertyLaw,
    ) -> Self {
        self.thermal_cond = Some(thermal_cond);
        self.heat_capacity = Some(heat_capacity);
        self.rho = Some(rho);
        self
    }

    /// Set the x extent.
    pub fn with_borders(mut self, x_min: f64, x_max: f64) -> Self {
        self.borders = Some([x_min, x_max]);
        self
    }

    /// Diffusivity at temperature `t`.
    pub fn diffusivity(&self, t: f64) -> f64 {
        arrhenius(self.d_0, self.e_d, t)
    }

    /// Solubility at temperature `t`, if defined.
    pub fn solubility(&self, t: f64) -> Option<f64> {
        self.s_0
            .map(|s_0| arrhenius(s_0, self.e_s.unwrap_or(0.0), t))
    }

    /// Whether `x` lies within this material's borders (inclusive).
    pub fn contains_x(&self, x: f64) -> bool {
        self.borders
            .is_some_and(|[lo, hi]| x >= lo && x <= hi)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(u32),
    Many(Vec<u32>),
}

/// Deserialize a marker list given either as a single id or an array.
/// Usable with `#[serde(deserialize_with = "...")]`.
pub fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MaterialIds, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => SmallVec::from_slice(&[id]),
        OneOrMany::Many(ids) => SmallVec::from_vec(ids),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn id_accepts_scalar_or_list() {
        let m: Material = serde_json::from_str(r#"{"id": 3, "D_0": 1.0, "E_D": 0.0}"#).unwrap();
        assert_eq!(m.id.as_slice(), &[3]);
        let m: Material =
            serde_json::from_str(r#"{"id": [1, 2], "D_0": 1.0, "E_D": 0.0}"#).unwrap();
        assert_eq!(m.id.as_slice(), &[1, 2]);
    }

    #[test]
    fn full_material_from_json() {
        let json = r#"{
            "id": 1, "D_0": 4.1e-7, "E_D": 0.39, "S_0": 1.3e-4, "E_S": 0.2,
            "thermal_cond": 173, "heat_capacity": 134, "rho": 19250,
            "H": {"free_enthalpy": 0.1, "entropy": 1e-4},
            "borders": [0, 1e-6]
        }"#;
        let m: Material = serde_json::from_str(json).unwrap();
        assert_relative_eq!(m.diffusivity(1e9), 4.1e-7, max_relative = 1e-5);
        assert!(m.solubility(500.0).is_some());
        assert_relative_eq!(m.heat_of_transport.unwrap().value(1000.0), 0.2);
        assert!(m.contains_x(5e-7));
        assert!(!m.contains_x(2e-6));
    }

    #[test]
    fn no_solubility_without_s0() {
        assert!(Material::new(1, 1.0, 0.0).solubility(300.0).is_none());
    }
}
