//! Field ids and storage layout of a transport simulation.

use hytrap_core::{FieldDef, FieldId, FieldSet};

/// Where each simulated quantity lives in the field store.
///
/// Temperature is field 0 and the concentration vector is field 1, with
/// `1 + n_traps` components stored cell-major: component `k` of cell `i`
/// is at `i * components + k`. Component 0 is the mobile species (scaled
/// by solubility under chemical potential); component `k > 0` is the
/// concentration held by trap `k`. Extrinsic trap densities follow as
/// one scalar field each, in trap declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Temperature, K.
    pub temperature: FieldId,
    /// Mobile and trapped concentrations.
    pub concentration: FieldId,
    /// One density field per extrinsic trap.
    pub extrinsic: Vec<FieldId>,
    /// Number of traps, intrinsic and extrinsic.
    pub n_traps: usize,
}

impl FieldLayout {
    /// Layout for `n_traps` traps, `n_extrinsic` of which are extrinsic.
    pub fn new(n_traps: usize, n_extrinsic: usize) -> Self {
        Self {
            temperature: FieldId(0),
            concentration: FieldId(1),
            extrinsic: (0..n_extrinsic as u32).map(|j| FieldId(2 + j)).collect(),
            n_traps,
        }
    }

    /// Components per cell of the concentration field.
    pub fn components(&self) -> usize {
        1 + self.n_traps
    }

    /// Flat index of `component` in `cell`.
    pub fn index(&self, cell: usize, component: usize) -> usize {
        cell * self.components() + component
    }

    /// Field definitions in id order.
    pub fn field_defs(&self) -> Vec<FieldDef> {
        let mut defs = vec![
            FieldDef::scalar("T", Some("K")),
            FieldDef::vector("concentration", self.components() as u32, Some("m^-3")),
        ];
        defs.extend(
            (1..=self.extrinsic.len())
                .map(|j| FieldDef::scalar(format!("extrinsic_density_{j}"), Some("m^-3"))),
        );
        defs
    }

    /// Every field id in the layout.
    pub fn defined_fields(&self) -> FieldSet {
        [self.temperature, self.concentration]
            .into_iter()
            .chain(self.extrinsic.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hytrap_core::FieldType;

    #[test]
    fn ids_are_dense_and_ordered() {
        let layout = FieldLayout::new(3, 2);
        assert_eq!(layout.components(), 4);
        assert_eq!(layout.extrinsic, vec![FieldId(2), FieldId(3)]);
        assert_eq!(layout.defined_fields().len(), 4);
        let defs = layout.field_defs();
        assert_eq!(defs.len(), 4);
        assert_eq!(defs[1].field_type, FieldType::Vector { dims: 4 });
        assert_eq!(defs[3].name, "extrinsic_density_2");
    }

    #[test]
    fn cell_major_indexing() {
        let layout = FieldLayout::new(2, 0);
        assert_eq!(layout.index(0, 0), 0);
        assert_eq!(layout.index(1, 0), 3);
        assert_eq!(layout.index(1, 2), 5);
    }
}
