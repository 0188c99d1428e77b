//! Result table paths and CSV I/O.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::EvaluationError;

/// Output files for one species run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub hab_stats: PathBuf,
    pub non_overlaps: PathBuf,
    pub anomalies: PathBuf,
    pub sensitivity: PathBuf,
    pub bpa_figure: PathBuf,
    pub bsm_figure: PathBuf,
}

impl OutputPaths {
    #[must_use]
    pub fn new(dir: &Path, species: &str) -> Self {
        Self {
            hab_stats: hab_stats_path(dir, species),
            non_overlaps: dir.join(format!("{species}-NonOverlaps.csv")),
            anomalies: dir.join(format!("{species}-Anomalies.csv")),
            sensitivity: dir.join(format!("{species}-Sensitivity.csv")),
            bpa_figure: dir.join(format!("{species}-BPA.svg")),
            bsm_figure: dir.join(format!("{species}-BSM.svg")),
        }
    }
}

/// Path of a species' overlay statistics table.
#[must_use]
pub fn hab_stats_path(dir: &Path, species: &str) -> PathBuf {
    dir.join(format!("{species}-HabStats.csv"))
}

/// Writes `rows` to `path`, replacing any existing file. An empty slice
/// produces an empty file.
///
/// # Errors
///
/// Returns [`EvaluationError`] if the file cannot be written.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), EvaluationError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Reads every row of a CSV table with headers.
///
/// # Errors
///
/// Returns [`EvaluationError`] if the file cannot be read or a row does not
/// deserialize.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, EvaluationError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}
