//! Final solution fields and the run output bundle.

use std::fmt;

use hytrap_core::{FieldId, FieldReader, SolveError};
use hytrap_expr::Expression;
use hytrap_materials::PropertySnapshot;
use hytrap_mesh::Mesh;
use hytrap_solver::FieldLayout;

use crate::metrics::RunSummary;
use crate::parameters::Parameters;
use crate::postprocess::DerivedTable;

// ── SolutionField ──────────────────────────────────────────────────

/// A per-cell quantity derived from the stored fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolutionField {
    /// Physical mobile concentration.
    Solute,
    /// Mobile plus every trapped concentration.
    Retention,
    /// Temperature.
    Temperature,
    /// Trapped concentration of trap `k`, 1-based.
    Trap(usize),
}

impl SolutionField {
    /// Parse a field name: `solute` (or `0`), `retention`, `T`, and
    /// `k` or `trap_k` for `1 <= k <= n_traps`.
    pub fn parse(name: &str, n_traps: usize) -> Option<Self> {
        match name {
            "solute" | "0" => Some(Self::Solute),
            "retention" => Some(Self::Retention),
            "T" => Some(Self::Temperature),
            other => {
                let k: usize = other.strip_prefix("trap_").unwrap_or(other).parse().ok()?;
                (1..=n_traps).contains(&k).then_some(Self::Trap(k))
            }
        }
    }

    /// Evaluate on every cell.
    pub fn values(
        &self,
        fields: &dyn FieldReader,
        layout: &FieldLayout,
        properties: &PropertySnapshot,
    ) -> Result<Vec<f64>, SolveError> {
        let cells = properties.cell_count();
        let components = layout.components();
        match *self {
            Self::Temperature => Ok(read_checked(fields, layout.temperature, cells)?.to_vec()),
            Self::Trap(k) => {
                if k == 0 || k > layout.n_traps {
                    return Err(SolveError::InvalidState {
                        reason: format!("no trap {k} among {} traps", layout.n_traps),
                    });
                }
                let c = read_checked(fields, layout.concentration, cells * components)?;
                Ok((0..cells).map(|i| c[i * components + k]).collect())
            }
            Self::Solute | Self::Retention => {
                let c = read_checked(fields, layout.concentration, cells * components)?;
                let with_traps = *self == Self::Retention;
                Ok((0..cells)
                    .map(|i| {
                        let row = &c[i * components..(i + 1) * components];
                        let solute = properties.solubility_or_one(i) * row[0];
                        if with_traps {
                            solute + row[1..].iter().sum::<f64>()
                        } else {
                            solute
                        }
                    })
                    .collect())
            }
        }
    }
}

impl fmt::Display for SolutionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solute => write!(f, "solute"),
            Self::Retention => write!(f, "retention"),
            Self::Temperature => write!(f, "T"),
            Self::Trap(k) => write!(f, "trap_{k}"),
        }
    }
}

fn read_checked(
    fields: &dyn FieldReader,
    field: FieldId,
    expected: usize,
) -> Result<&[f64], SolveError> {
    let data = fields
        .read(field)
        .ok_or(SolveError::FieldUnavailable { field })?;
    if data.len() != expected {
        return Err(SolveError::SizeMismatch {
            field,
            expected,
            actual: data.len(),
        });
    }
    Ok(data)
}

// ── Solutions ──────────────────────────────────────────────────────

/// Per-cell values of every reported field.
#[derive(Clone, Debug, PartialEq)]
pub struct Solutions {
    /// Physical mobile concentration (`S * u` under chemical potential).
    pub solute: Vec<f64>,
    /// Temperature.
    pub temperature: Vec<f64>,
    /// Trapped concentrations, `traps[k - 1]` for trap `k`.
    pub traps: Vec<Vec<f64>>,
    /// `solute + sum(traps)`.
    pub retention: Vec<f64>,
}

impl Solutions {
    /// Look a field up by its output name: `solute`, `T`, `retention`
    /// or `trap_k`.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        match SolutionField::parse(name, self.traps.len())? {
            SolutionField::Solute => Some(&self.solute),
            SolutionField::Temperature => Some(&self.temperature),
            SolutionField::Retention => Some(&self.retention),
            SolutionField::Trap(k) => self.traps.get(k - 1).map(|v| v.as_slice()),
        }
    }

    /// The values indexed as `[solute, trap_1, .., trap_n, T]`.
    pub fn by_index(&self, index: usize) -> Option<&[f64]> {
        match index {
            0 => Some(&self.solute),
            i if i <= self.traps.len() => Some(&self.traps[i - 1]),
            i if i == self.traps.len() + 1 => Some(&self.temperature),
            _ => None,
        }
    }
}

/// Derive the reported solutions from the stored fields.
///
/// The mobile component is multiplied by the cell's solubility when
/// chemical potential is active.
pub fn make_output(
    fields: &dyn FieldReader,
    layout: &FieldLayout,
    properties: &PropertySnapshot,
) -> Result<Solutions, SolveError> {
    let solute = SolutionField::Solute.values(fields, layout, properties)?;
    let temperature = SolutionField::Temperature.values(fields, layout, properties)?;
    let traps = (1..=layout.n_traps)
        .map(|k| SolutionField::Trap(k).values(fields, layout, properties))
        .collect::<Result<Vec<_>, _>>()?;
    let retention = (0..solute.len())
        .map(|i| solute[i] + traps.iter().map(|t| t[i]).sum::<f64>())
        .collect();
    Ok(Solutions {
        solute,
        temperature,
        traps,
        retention,
    })
}

// ── Errors against exact solutions ─────────────────────────────────

/// Norm used to compare computed and exact solutions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorNorm {
    /// `max |exact - computed|` over cell centroids (`error_max`).
    Max,
    /// `sqrt(sum (exact - computed)^2 |cell|)` (`L2`).
    L2,
}

impl ErrorNorm {
    /// Parse `error_max` or `L2`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "error_max" => Some(Self::Max),
            "L2" => Some(Self::L2),
            _ => None,
        }
    }
}

/// One requested error computation.
#[derive(Clone, Debug)]
pub struct ErrorSpec {
    /// Exact solutions, evaluated at the final time.
    pub exact_solutions: Vec<Expression>,
    /// Indices into `[solute, trap_1, .., trap_n, T]`.
    pub computed_solutions: Vec<usize>,
    /// Norm.
    pub norm: ErrorNorm,
}

/// Errors of one [`ErrorSpec`], one per computed solution.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorReport {
    /// Norm used.
    pub norm: ErrorNorm,
    /// One value per `(exact, computed)` pair.
    pub values: Vec<f64>,
}

/// Compare computed solutions against exact expressions at `time`.
pub fn compute_errors(
    specs: &[ErrorSpec],
    solutions: &Solutions,
    mesh: &dyn Mesh,
    time: f64,
) -> Result<Vec<ErrorReport>, SolveError> {
    specs
        .iter()
        .map(|spec| {
            let values = spec
                .exact_solutions
                .iter()
                .zip(&spec.computed_solutions)
                .map(|(exact, &index)| {
                    let computed =
                        solutions
                            .by_index(index)
                            .ok_or_else(|| SolveError::InvalidState {
                                reason: format!("no computed solution at index {index}"),
                            })?;
                    let diffs = computed
                        .iter()
                        .enumerate()
                        .map(|(c, v)| (c, exact.evaluate(&mesh.centroid(c), time) - v));
                    Ok(match spec.norm {
                        ErrorNorm::Max => diffs.map(|(_, d)| d.abs()).fold(0.0, f64::max),
                        ErrorNorm::L2 => diffs
                            .map(|(c, d)| d * d * mesh.volume(c))
                            .sum::<f64>()
                            .sqrt(),
                    })
                })
                .collect::<Result<Vec<_>, SolveError>>()?;
            Ok(ErrorReport {
                norm: spec.norm,
                values,
            })
        })
        .collect()
}

// ── Output ─────────────────────────────────────────────────────────

/// Everything a run produces.
pub struct Output {
    /// The parameters the run was configured with.
    pub parameters: Parameters,
    /// The mesh the fields live on.
    pub mesh: Box<dyn Mesh>,
    /// Final per-cell solutions.
    pub solutions: Solutions,
    /// Requested error norms, if any.
    pub error: Option<Vec<ErrorReport>>,
    /// Derived-quantity table, header first, if requested.
    pub derived_quantities: Option<DerivedTable>,
    /// Step count, final time and metrics.
    pub summary: RunSummary,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("cells", &self.mesh.cell_count())
            .field("solutions", &self.solutions)
            .field("error", &self.error)
            .field("derived_quantities", &self.derived_quantities)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}
