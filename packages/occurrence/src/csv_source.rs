//! Occurrences from a flat CSV table.
//!
//! Required columns are `occ_id`, `longitude`, `latitude` and
//! `coordinateUncertaintyInMeters`. The uncertainty may be blank or
//! unparseable, in which case it is read as missing. A blank or unparseable
//! coordinate is read as NaN so the record reaches point screening and is
//! reported there instead of failing the whole table. An optional `species`
//! column restricts rows to one species; without it every row is returned
//! regardless of the requested species.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{OccurrenceError, OccurrencePoint, OccurrenceSource};

/// A CSV file of occurrence records.
#[derive(Debug, Clone)]
pub struct CsvOccurrenceSource {
    path: PathBuf,
}

impl CsvOccurrenceSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying CSV file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    occ_id: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    longitude: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    latitude: Option<f64>,
    #[serde(
        rename = "coordinateUncertaintyInMeters",
        deserialize_with = "csv::invalid_option"
    )]
    coordinate_uncertainty_m: Option<f64>,
    #[serde(default)]
    species: Option<String>,
}

impl OccurrenceSource for CsvOccurrenceSource {
    fn fetch_occurrences(&self, species: &str) -> Result<Vec<OccurrencePoint>, OccurrenceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut points = Vec::new();
        let mut skipped = 0u64;

        for row in reader.deserialize::<CsvRow>() {
            let row = row?;
            if let Some(row_species) = &row.species
                && !row_species.eq_ignore_ascii_case(species)
            {
                skipped += 1;
                continue;
            }
            points.push(OccurrencePoint {
                id: row.occ_id,
                longitude: row.longitude.unwrap_or(f64::NAN),
                latitude: row.latitude.unwrap_or(f64::NAN),
                coordinate_uncertainty_m: row.coordinate_uncertainty_m,
            });
        }

        log::debug!(
            "Read {} occurrences for {species} from {} ({skipped} rows for other species)",
            points.len(),
            self.path.display()
        );

        Ok(points)
    }
}
