//! Cell-to-material mapping and property snapshots.

use hytrap_mesh::Mesh;

use crate::error::MaterialError;
use crate::material::Material;

/// Per-cell material properties evaluated at one temperature field.
///
/// Snapshots are immutable. A new one is produced by
/// [`MaterialTable::refresh`] every time temperature changes; stages never
/// see a snapshot that mixes two temperatures.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertySnapshot {
    /// Diffusivity per cell.
    pub diffusivity: Vec<f64>,
    /// Solubility per cell. `Some` iff the chemical-potential formulation
    /// is active.
    pub solubility: Option<Vec<f64>>,
    /// Thermal conductivity per cell, if every material defines it.
    pub thermal_conductivity: Option<Vec<f64>>,
    /// Specific heat capacity per cell, if every material defines it.
    pub heat_capacity: Option<Vec<f64>>,
    /// Density per cell, if every material defines it.
    pub density: Option<Vec<f64>>,
    /// Heat of transport per cell, zero where a material has none.
    /// `None` when no material defines it.
    pub heat_of_transport: Option<Vec<f64>>,
}

impl PropertySnapshot {
    /// Number of cells covered.
    pub fn cell_count(&self) -> usize {
        self.diffusivity.len()
    }

    /// Solubility of `cell`, or `1.0` without chemical potential.
    pub fn solubility_or_one(&self, cell: usize) -> f64 {
        self.solubility.as_ref().map_or(1.0, |s| s[cell])
    }
}

/// Maps each mesh cell to its [`Material`] and evaluates property laws.
#[derive(Clone, Debug)]
pub struct MaterialTable {
    materials: Vec<Material>,
    cell_material: Vec<usize>,
    chemical_potential: bool,
}

impl MaterialTable {
    /// Bind materials to the mesh's volume markers.
    ///
    /// Chemical potential is enabled when every material defines `S_0`.
    /// A partial definition is an error.
    pub fn new(materials: Vec<Material>, mesh: &dyn Mesh) -> Result<Self, MaterialError> {
        if materials.is_empty() {
            return Err(MaterialError::NoMaterials);
        }
        let mut seen = Vec::new();
        for m in &materials {
            for &id in &m.id {
                if seen.contains(&id) {
                    return Err(MaterialError::DuplicateId { id });
                }
                seen.push(id);
            }
        }

        let with_s = materials.iter().filter(|m| m.s_0.is_some()).count();
        if with_s != 0 && with_s != materials.len() {
            let missing = materials
                .iter()
                .filter(|m| m.s_0.is_none())
                .flat_map(|m| m.id.iter().copied())
                .collect();
            return Err(MaterialError::MixedChemicalPotential { missing });
        }

        let mut cell_material = Vec::with_capacity(mesh.cell_count());
        for cell in 0..mesh.cell_count() {
            let marker = mesh.volume_marker(cell);
            let index = materials
                .iter()
                .position(|m| m.id.contains(&marker))
                .ok_or(MaterialError::UnknownVolumeMarker { cell, marker })?;
            cell_material.push(index);
        }

        Ok(Self {
            chemical_potential: with_s == materials.len(),
            materials,
            cell_material,
        })
    }

    /// All materials in declaration order.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// The material covering `cell`.
    pub fn material_of(&self, cell: usize) -> &Material {
        &self.materials[self.cell_material[cell]]
    }

    /// Number of mesh cells mapped.
    pub fn cell_count(&self) -> usize {
        self.cell_material.len()
    }

    /// Whether the chemical-potential formulation is active.
    pub fn chemical_potential(&self) -> bool {
        self.chemical_potential
    }

    /// Whether every material has conductivity, heat capacity and density.
    pub fn has_thermal_properties(&self) -> bool {
        self.materials
            .iter()
            .all(|m| m.thermal_cond.is_some() && m.heat_capacity.is_some() && m.rho.is_some())
    }

    /// Evaluate every property at the given per-cell temperature.
    ///
    /// Deterministic: the same temperature always yields a bit-identical
    /// snapshot.
    pub fn refresh(&self, temperature: &[f64]) -> Result<PropertySnapshot, MaterialError> {
        if temperature.len() != self.cell_material.len() {
            return Err(MaterialError::TemperatureSizeMismatch {
                expected: self.cell_material.len(),
                actual: temperature.len(),
            });
        }
        let cells = || temperature.iter().enumerate();

        let diffusivity = cells()
            .map(|(c, &t)| self.material_of(c).diffusivity(t))
            .collect();
        let solubility = self.chemical_potential.then(|| {
            cells()
                .map(|(c, &t)| self.material_of(c).solubility(t).unwrap_or(1.0))
                .collect()
        });

        let all = |f: fn(&Material) -> bool| self.materials.iter().all(f);
        let thermal_conductivity = all(|m| m.thermal_cond.is_some()).then(|| {
            cells()
                .map(|(c, &t)| self.thermal_conductivity_at(c, t).0)
                .collect()
        });
        let heat_capacity = all(|m| m.heat_capacity.is_some()).then(|| {
            cells()
                .map(|(c, &t)| {
                    self.material_of(c)
                        .heat_capacity
                        .as_ref()
                        .map_or(0.0, |law| law.value(t))
                })
                .collect()
        });
        let density = all(|m| m.rho.is_some()).then(|| {
            cells()
                .map(|(c, &t)| {
                    self.material_of(c)
                        .rho
                        .as_ref()
                        .map_or(0.0, |law| law.value(t))
                })
                .collect()
        });
        let heat_of_transport = self
            .materials
            .iter()
            .any(|m| m.heat_of_transport.is_some())
            .then(|| {
                cells()
                    .map(|(c, &t)| {
                        self.material_of(c)
                            .heat_of_transport
                            .map_or(0.0, |h| h.value(t))
                    })
                    .collect()
            });

        Ok(PropertySnapshot {
            diffusivity,
            solubility,
            thermal_conductivity,
            heat_capacity,
            density,
            heat_of_transport,
        })
    }

    /// Solubility of `cell` at temperature `t`, if chemical potential is on.
    pub fn solubility_at(&self, cell: usize, t: f64) -> Option<f64> {
        if !self.chemical_potential {
            return None;
        }
        self.material_of(cell).solubility(t)
    }

    /// Thermal conductivity of `cell` at `t` and its temperature
    /// derivative. Zero when undefined.
    pub fn thermal_conductivity_at(&self, cell: usize, t: f64) -> (f64, f64) {
        self.material_of(cell)
            .thermal_cond
            .as_ref()
            .map_or((0.0, 0.0), |law| (law.value(t), law.derivative(t)))
    }

    /// Volumetric heat capacity `rho * cp` of `cell` at `t` and its
    /// temperature derivative. Zero when either law is undefined.
    pub fn volumetric_heat_capacity_at(&self, cell: usize, t: f64) -> (f64, f64) {
        let m = self.material_of(cell);
        match (&m.rho, &m.heat_capacity) {
            (Some(rho), Some(cp)) => {
                let (r, dr) = (rho.value(t), rho.derivative(t));
                let (c, dc) = (cp.value(t), cp.derivative(t));
                (r * c, dr * c + r * dc)
            }
            _ => (0.0, 0.0),
        }
    }
}
