//! Post-processing: the per-step read-only view and derived quantities.
//!
//! After every successful step the engine hands each [`PostProcessor`]
//! a [`StepView`]. Processors may return a record of derived values; the
//! engine concatenates the records of one step into a row of the
//! [`DerivedTable`]. The view only lends shared references, so no
//! processor can change a field.

use std::error::Error;
use std::fmt;

use hytrap_core::{FieldReader, SolveError};
use hytrap_expr::ExpressionClock;
use hytrap_materials::{MaterialTable, PropertySnapshot};
use hytrap_mesh::Mesh;
use hytrap_solver::{
    heat_surface_outflow, transport_surface_outflow, FieldLayout, HeatBc, StepInfo, TransportBc,
};

use crate::config::ConfigurationError;
use crate::export::ExportError;
use crate::output::SolutionField;
use crate::parameters::{DerivedQuantitiesParameters, VolumeQuantity};

// ── StepView ───────────────────────────────────────────────────────

/// Read-only state after a step's solves.
pub struct StepView<'a> {
    /// Latest value of every field.
    pub fields: &'a dyn FieldReader,
    /// Committed values from the end of the previous step.
    pub previous: &'a dyn FieldReader,
    /// The mesh.
    pub mesh: &'a dyn Mesh,
    /// Properties at the step's final temperature.
    pub properties: &'a PropertySnapshot,
    /// Material table.
    pub materials: &'a MaterialTable,
    /// Expression clock at the step's time.
    pub expressions: &'a ExpressionClock,
    /// Field ids.
    pub layout: &'a FieldLayout,
    /// Index, time and size of the step.
    pub step: StepInfo,
    /// Whether this is the last step of the run.
    pub final_step: bool,
}

// ── PostProcessor ──────────────────────────────────────────────────

/// Errors raised while post-processing a step.
#[derive(Debug)]
pub enum PostProcessError {
    /// A field was missing or malformed.
    Field(SolveError),
    /// A snapshot could not be recorded.
    Export(ExportError),
}

impl fmt::Display for PostProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(e) => write!(f, "{e}"),
            Self::Export(e) => write!(f, "{e}"),
        }
    }
}

impl Error for PostProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Field(e) => Some(e),
            Self::Export(e) => Some(e),
        }
    }
}

impl From<SolveError> for PostProcessError {
    fn from(e: SolveError) -> Self {
        Self::Field(e)
    }
}

impl From<ExportError> for PostProcessError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

/// A consumer of per-step state.
pub trait PostProcessor: Send {
    /// Name for error reports.
    fn name(&self) -> &str;

    /// Column labels of the records returned by [`process`](Self::process).
    fn header(&self) -> Vec<String> {
        Vec::new()
    }

    /// Consume one step. Returns a record matching [`header`](Self::header),
    /// or `None` if this processor produces no table rows.
    fn process(&mut self, view: &StepView<'_>) -> Result<Option<Vec<f64>>, PostProcessError>;

    /// Called once after the last step.
    fn finish(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

// ── DerivedTable ───────────────────────────────────────────────────

/// Accumulated derived quantities: a header row and one row per step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedTable {
    /// Column labels, `t(s)` first.
    pub header: Vec<String>,
    /// One row per step.
    pub rows: Vec<Vec<f64>>,
}

impl DerivedTable {
    /// All values of the column labelled `label`.
    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        let i = self.header.iter().position(|h| h == label)?;
        self.rows.iter().map(|row| row.get(i).copied()).collect()
    }
}

// ── DerivedQuantities ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Quantity {
    SurfaceFlux(u32),
    AverageVolume(u32),
    MinimumVolume(u32),
    MaximumVolume(u32),
    TotalVolume(u32),
    TotalSurface(u32),
}

/// Surface and volume integrals of solution fields, one row per step.
pub struct DerivedQuantities {
    quantities: Vec<(SolutionField, Quantity)>,
    header: Vec<String>,
    transport_bcs: Vec<TransportBc>,
    heat_bcs: Option<Vec<HeatBc>>,
}

impl DerivedQuantities {
    /// Resolve the configured quantities against the mesh.
    ///
    /// `heat_bcs` is `Some` only when temperature is solved; a heat flux
    /// is not defined otherwise.
    pub fn new(
        parameters: &DerivedQuantitiesParameters,
        mesh: &dyn Mesh,
        n_traps: usize,
        transport_bcs: Vec<TransportBc>,
        heat_bcs: Option<Vec<HeatBc>>,
    ) -> Result<Self, ConfigurationError> {
        let surfaces = mesh.surface_markers();
        let field = |key: &str, name: &str| {
            SolutionField::parse(name, n_traps).ok_or_else(|| ConfigurationError::InvalidValue {
                key: format!("derived_quantities.{key}"),
                reason: format!("unknown field '{name}'"),
            })
        };
        let surface = |key: &str, s: u32| {
            if surfaces.contains(&s) {
                Ok(s)
            } else {
                Err(ConfigurationError::InvalidValue {
                    key: format!("derived_quantities.{key}"),
                    reason: format!("no surface {s} on the mesh"),
                })
            }
        };
        let volume = |key: &str, v: u32| {
            if (0..mesh.cell_count()).any(|c| mesh.volume_marker(c) == v) {
                Ok(v)
            } else {
                Err(ConfigurationError::InvalidValue {
                    key: format!("derived_quantities.{key}"),
                    reason: format!("no cell has volume marker {v}"),
                })
            }
        };

        let mut quantities = Vec::new();
        let mut header = vec!["t(s)".to_string()];

        for q in &parameters.surface_flux {
            let f = field("surface_flux", &q.field)?;
            match f {
                SolutionField::Solute => {}
                SolutionField::Temperature if heat_bcs.is_some() => {}
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        key: "derived_quantities.surface_flux".into(),
                        reason: format!("no flux defined for field '{}'", q.field),
                    })
                }
            }
            for &s in &q.surfaces {
                quantities.push((f, Quantity::SurfaceFlux(surface("surface_flux", s)?)));
                header.push(format!("Flux surface {s}: {}", q.field));
            }
        }
        let volume_kinds: [(&str, &[VolumeQuantity], fn(u32) -> Quantity, &str); 4] = [
            (
                "average_volume",
                &parameters.average_volume,
                Quantity::AverageVolume,
                "Average",
            ),
            (
                "minimum_volume",
                &parameters.minimum_volume,
                Quantity::MinimumVolume,
                "Minimum",
            ),
            (
                "maximum_volume",
                &parameters.maximum_volume,
                Quantity::MaximumVolume,
                "Maximum",
            ),
            (
                "total_volume",
                &parameters.total_volume,
                Quantity::TotalVolume,
                "Total",
            ),
        ];
        for (key, list, make, prefix) in volume_kinds {
            for q in list {
                let f = field(key, &q.field)?;
                for &v in &q.volumes {
                    quantities.push((f, make(volume(key, v)?)));
                    header.push(format!("{prefix} {} volume {v}", q.field));
                }
            }
        }
        for q in &parameters.total_surface {
            let f = field("total_surface", &q.field)?;
            for &s in &q.surfaces {
                quantities.push((f, Quantity::TotalSurface(surface("total_surface", s)?)));
                header.push(format!("Total {} surface {s}", q.field));
            }
        }

        Ok(Self {
            quantities,
            header,
            transport_bcs,
            heat_bcs,
        })
    }

    fn surface_flux(
        &self,
        field: SolutionField,
        surface: u32,
        view: &StepView<'_>,
    ) -> Result<f64, SolveError> {
        let layout = view.layout;
        let read = |id| {
            view.fields
                .read(id)
                .ok_or(SolveError::FieldUnavailable { field: id })
        };
        let temperature = read(layout.temperature)?;
        match (field, &self.heat_bcs) {
            (SolutionField::Temperature, Some(bcs)) => Ok(heat_surface_outflow(
                bcs,
                view.mesh,
                surface,
                temperature,
                view.materials,
                view.expressions,
            )),
            (SolutionField::Solute, _) => Ok(transport_surface_outflow(
                &self.transport_bcs,
                view.mesh,
                surface,
                read(layout.concentration)?,
                layout.components(),
                temperature,
                view.properties,
                view.expressions,
            )),
            _ => Err(SolveError::InvalidState {
                reason: format!("no flux defined for {field}"),
            }),
        }
    }
}

impl PostProcessor for DerivedQuantities {
    fn name(&self) -> &str {
        "derived_quantities"
    }

    fn header(&self) -> Vec<String> {
        self.header.clone()
    }

    fn process(&mut self, view: &StepView<'_>) -> Result<Option<Vec<f64>>, PostProcessError> {
        let mesh = view.mesh;
        let in_volume = |v: u32| (0..mesh.cell_count()).filter(move |&c| mesh.volume_marker(c) == v);
        let mut record = Vec::with_capacity(self.header.len());
        record.push(view.step.time);
        for &(field, quantity) in &self.quantities {
            let value = match quantity {
                Quantity::SurfaceFlux(s) => self.surface_flux(field, s, view)?,
                Quantity::TotalSurface(s) => {
                    let values = field.values(view.fields, view.layout, view.properties)?;
                    mesh.boundary_faces()
                        .iter()
                        .filter(|face| face.surface == s)
                        .map(|face| values[face.cell] * face.area)
                        .sum()
                }
                Quantity::AverageVolume(v) => {
                    let values = field.values(view.fields, view.layout, view.properties)?;
                    let (integral, measure) = in_volume(v).fold((0.0, 0.0), |(i, m), c| {
                        (i + values[c] * mesh.volume(c), m + mesh.volume(c))
                    });
                    integral / measure
                }
                Quantity::MinimumVolume(v) => {
                    let values = field.values(view.fields, view.layout, view.properties)?;
                    in_volume(v).map(|c| values[c]).fold(f64::INFINITY, f64::min)
                }
                Quantity::MaximumVolume(v) => {
                    let values = field.values(view.fields, view.layout, view.properties)?;
                    in_volume(v)
                        .map(|c| values[c])
                        .fold(f64::NEG_INFINITY, f64::max)
                }
                Quantity::TotalVolume(v) => {
                    let values = field.values(view.fields, view.layout, view.properties)?;
                    in_volume(v).map(|c| values[c] * mesh.volume(c)).sum()
                }
            };
            record.push(value);
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hytrap_core::StepIndex;
    use hytrap_expr::Expression;
    use hytrap_materials::Material;
    use hytrap_mesh::IntervalMesh;
    use hytrap_solver::TransportBcKind;
    use hytrap_test_utils::MockFieldReader;
    use smallvec::smallvec;

    use crate::parameters::SurfaceQuantity;

    /// Run `f` against a two-cell view on `[0, 1]` with mobile
    /// concentration `[1, 3]`, `T = 300` and no traps.
    pub(crate) fn with_view(time: f64, final_step: bool, f: impl FnOnce(&StepView<'_>)) {
        let mut mesh = IntervalMesh::uniform(1.0, 2).unwrap();
        mesh.mark_volumes(|p| if p[0] < 0.5 { 1 } else { 2 });
        let table = MaterialTable::new(
            vec![Material::new(1, 1.0, 0.0), Material::new(2, 1.0, 0.0)],
            &mesh,
        )
        .unwrap();
        let props = table.refresh(&[300.0, 300.0]).unwrap();
        let layout = FieldLayout::new(0, 0);
        let mut fields = MockFieldReader::new();
        fields.set_field(layout.temperature, vec![300.0, 300.0]);
        fields.set_field(layout.concentration, vec![1.0, 3.0]);
        let clock = ExpressionClock::new();
        let view = StepView {
            fields: &fields,
            previous: &fields,
            mesh: &mesh,
            properties: &props,
            materials: &table,
            expressions: &clock,
            layout: &layout,
            step: StepInfo::transient(StepIndex(1), time, 1.0),
            final_step,
        };
        f(&view);
    }

    fn mesh() -> IntervalMesh {
        let mut mesh = IntervalMesh::uniform(1.0, 2).unwrap();
        mesh.mark_volumes(|p| if p[0] < 0.5 { 1 } else { 2 });
        mesh
    }

    #[test]
    fn header_labels_follow_quantity_types() {
        let params = DerivedQuantitiesParameters {
            surface_flux: vec![SurfaceQuantity {
                field: "solute".into(),
                surfaces: vec![1, 2],
            }],
            average_volume: vec![VolumeQuantity {
                field: "solute".into(),
                volumes: vec![1],
            }],
            total_volume: vec![VolumeQuantity {
                field: "retention".into(),
                volumes: vec![2],
            }],
            total_surface: vec![SurfaceQuantity {
                field: "T".into(),
                surfaces: vec![2],
            }],
            ..Default::default()
        };
        let dq = DerivedQuantities::new(&params, &mesh(), 0, Vec::new(), None).unwrap();
        assert_eq!(
            dq.header(),
            vec![
                "t(s)",
                "Flux surface 1: solute",
                "Flux surface 2: solute",
                "Average solute volume 1",
                "Total retention volume 2",
                "Total T surface 2",
            ]
        );
    }

    #[test]
    fn volume_statistics() {
        let params = DerivedQuantitiesParameters {
            average_volume: vec![VolumeQuantity {
                field: "solute".into(),
                volumes: vec![1, 2],
            }],
            minimum_volume: vec![VolumeQuantity {
                field: "solute".into(),
                volumes: vec![2],
            }],
            maximum_volume: vec![VolumeQuantity {
                field: "solute".into(),
                volumes: vec![1],
            }],
            total_volume: vec![VolumeQuantity {
                field: "solute".into(),
                volumes: vec![2],
            }],
            total_surface: vec![SurfaceQuantity {
                field: "solute".into(),
                surfaces: vec![2],
            }],
            ..Default::default()
        };
        let mut dq = DerivedQuantities::new(&params, &mesh(), 0, Vec::new(), None).unwrap();
        with_view(2.0, false, |view| {
            let record = dq.process(view).unwrap().unwrap();
            assert_eq!(record.len(), dq.header().len());
            assert_eq!(record[0], 2.0);
            assert_relative_eq!(record[1], 1.0);
            assert_relative_eq!(record[2], 3.0);
            assert_relative_eq!(record[3], 3.0);
            assert_relative_eq!(record[4], 1.0);
            assert_relative_eq!(record[5], 1.5);
            assert_relative_eq!(record[6], 3.0);
        });
    }

    #[test]
    fn solute_flux_is_outward_positive() {
        let mut clock = ExpressionClock::new();
        let zero = clock.register("bc", Expression::constant(0.0));
        let bcs = vec![TransportBc {
            surfaces: smallvec![2],
            kind: TransportBcKind::Dirichlet { value: zero },
        }];
        let params = DerivedQuantitiesParameters {
            surface_flux: vec![SurfaceQuantity {
                field: "solute".into(),
                surfaces: vec![2],
            }],
            ..Default::default()
        };
        let mut dq = DerivedQuantities::new(&params, &mesh(), 0, bcs, None).unwrap();
        let mesh = mesh();
        let table = MaterialTable::new(
            vec![Material::new(1, 1.0, 0.0), Material::new(2, 1.0, 0.0)],
            &mesh,
        )
        .unwrap();
        let props = table.refresh(&[300.0, 300.0]).unwrap();
        let layout = FieldLayout::new(0, 0);
        let mut fields = MockFieldReader::new();
        fields.set_field(layout.temperature, vec![300.0, 300.0]);
        fields.set_field(layout.concentration, vec![1.0, 3.0]);
        let view = StepView {
            fields: &fields,
            previous: &fields,
            mesh: &mesh,
            properties: &props,
            materials: &table,
            expressions: &clock,
            layout: &layout,
            step: StepInfo::stationary(),
            final_step: true,
        };
        let record = dq.process(&view).unwrap().unwrap();
        // D (c - 0) / (h / 2) with h = 0.5, c = 3.
        assert_relative_eq!(record[1], 12.0, max_relative = 1e-12);
    }

    #[test]
    fn heat_flux_needs_solved_temperature() {
        let params = DerivedQuantitiesParameters {
            surface_flux: vec![SurfaceQuantity {
                field: "T".into(),
                surfaces: vec![1],
            }],
            ..Default::default()
        };
        assert!(matches!(
            DerivedQuantities::new(&params, &mesh(), 0, Vec::new(), None),
            Err(ConfigurationError::InvalidValue { .. })
        ));
        assert!(DerivedQuantities::new(&params, &mesh(), 0, Vec::new(), Some(Vec::new())).is_ok());
    }

    #[test]
    fn unknown_markers_rejected() {
        let params = DerivedQuantitiesParameters {
            total_volume: vec![VolumeQuantity {
                field: "solute".into(),
                volumes: vec![7],
            }],
            ..Default::default()
        };
        assert!(DerivedQuantities::new(&params, &mesh(), 0, Vec::new(), None).is_err());
        let params = DerivedQuantitiesParameters {
            surface_flux: vec![SurfaceQuantity {
                field: "solute".into(),
                surfaces: vec![3],
            }],
            ..Default::default()
        };
        assert!(DerivedQuantities::new(&params, &mesh(), 0, Vec::new(), None).is_err());
    }

    #[test]
    fn table_columns_by_label() {
        let table = DerivedTable {
            header: vec!["t(s)".into(), "x".into()],
            rows: vec![vec![1.0, 10.0], vec![2.0, 20.0]],
        };
        assert_eq!(table.column("x"), Some(vec![10.0, 20.0]));
        assert_eq!(table.column("y"), None);
    }
}
