//! File exports: the parameter echo and CSV tables.

use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::parameters::{DerivedQuantitiesParameters, Parameters};
use crate::postprocess::DerivedTable;

/// Errors writing an export.
#[derive(Debug)]
pub enum ExportError {
    /// Filesystem failure.
    Io {
        /// The file or directory being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The value could not be serialized, e.g. a closure expression.
    Serialize {
        /// Serializer message.
        reason: String,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot write {}: {source}", path.display()),
            Self::Serialize { reason } => write!(f, "cannot serialize: {reason}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize { .. } => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn create_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(io_error(dir)),
        _ => Ok(()),
    }
}

/// Write the parameters as pretty JSON to `{stem}.json`.
///
/// Fails with [`ExportError::Serialize`] when any expression is a
/// closure.
pub fn export_parameters(parameters: &Parameters, stem: &str) -> Result<PathBuf, ExportError> {
    let json = serde_json::to_string_pretty(parameters).map_err(|e| ExportError::Serialize {
        reason: e.to_string(),
    })?;
    let path = if stem.ends_with(".json") {
        PathBuf::from(stem)
    } else {
        PathBuf::from(format!("{stem}.json"))
    };
    create_parent(&path)?;
    fs::write(&path, json).map_err(io_error(&path))?;
    Ok(path)
}

/// Write a header row and numeric rows as comma-separated values.
pub fn write_csv(path: &Path, header: &[String], rows: &[Vec<f64>]) -> Result<(), ExportError> {
    create_parent(path)?;
    let file = File::create(path).map_err(io_error(path))?;
    let mut out = BufWriter::new(file);
    let write_all = |out: &mut BufWriter<File>| -> io::Result<()> {
        writeln!(out, "{}", header.join(","))?;
        for row in rows {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(","))?;
        }
        out.flush()
    };
    write_all(&mut out).map_err(io_error(path))
}

/// Write the derived-quantity table to `{folder}/{file}`.
pub fn write_derived_quantities(
    spec: &DerivedQuantitiesParameters,
    table: &DerivedTable,
) -> Result<PathBuf, ExportError> {
    let mut path = PathBuf::from(&spec.folder);
    path.push(&spec.file);
    if path.extension().is_none() {
        path.set_extension("csv");
    }
    write_csv(&path, &table.header, &table.rows)?;
    Ok(path)
}
