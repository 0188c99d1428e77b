#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Habitat map evaluation result rows and run configuration.
//!
//! Result rows serialize with the column headers used by the exported CSV
//! tables (`BufferDist`, `nCellsHab`, `PropHab`, ...), so tables written by
//! one run can be read back by the multi-species compile steps.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Distance thresholds (meters) for the sensitivity buckets.
pub const DEFAULT_THRESHOLDS: [u32; 7] = [30, 100, 500, 1000, 2000, 5000, 10000];

/// Default minimum buffer radius in meters.
pub const DEFAULT_MIN_BUFFER_DISTANCE: f64 = 30.0;

/// Overlay statistics for one buffer that overlaps the raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStat {
    #[serde(rename = "OccID")]
    pub occ_id: String,
    #[serde(rename = "BufferDist")]
    pub buffer_distance: f64,
    #[serde(rename = "nCellsHab")]
    pub habitat_cells: u64,
    #[serde(rename = "nCellsNon")]
    pub non_habitat_cells: u64,
    #[serde(rename = "nCells")]
    pub total_cells: u64,
    #[serde(rename = "PropHab")]
    pub habitat_proportion: f64,
    #[serde(rename = "PropNonHab")]
    pub non_habitat_proportion: f64,
    /// Footprint cells with other codes or nodata, excluded from `nCells`.
    #[serde(rename = "nCellsOther", default)]
    pub other_cells: u64,
}

impl OverlayStat {
    /// Builds a row from cell counts. Proportions are 0 when no habitat or
    /// non-habitat cells were counted.
    #[must_use]
    pub fn new(
        occ_id: impl Into<String>,
        buffer_distance: f64,
        habitat_cells: u64,
        non_habitat_cells: u64,
        other_cells: u64,
    ) -> Self {
        let total_cells = habitat_cells + non_habitat_cells;
        #[allow(clippy::cast_precision_loss)]
        let (habitat_proportion, non_habitat_proportion) = if total_cells == 0 {
            (0.0, 0.0)
        } else {
            let total = total_cells as f64;
            (habitat_cells as f64 / total, non_habitat_cells as f64 / total)
        };

        Self {
            occ_id: occ_id.into(),
            buffer_distance,
            habitat_cells,
            non_habitat_cells,
            total_cells,
            habitat_proportion,
            non_habitat_proportion,
            other_cells,
        }
    }
}

/// A buffer whose bounding box does not intersect the raster extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonOverlap {
    #[serde(rename = "OccID")]
    pub occ_id: String,
    #[serde(rename = "BufferDist")]
    pub buffer_distance: f64,
}

/// Data-quality issue categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum AnomalyKind {
    /// Coordinate uncertainty absent, negative, or not a number.
    MissingUncertainty,
    /// Longitude/latitude not finite or out of range.
    InvalidCoordinate,
    /// Footprint contained codes other than habitat, 0, or nodata.
    UnexpectedCellCodes,
    /// No cell centre fell inside the buffer.
    EmptyFootprint,
    /// Dropped as a duplicate of another point at the same coordinates.
    DuplicateCoordinate,
}

/// One data-quality issue tied to an occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "OccID")]
    pub occ_id: String,
    #[serde(rename = "Kind")]
    pub kind: AnomalyKind,
    #[serde(rename = "Detail")]
    pub detail: String,
}

impl Anomaly {
    #[must_use]
    pub fn new(occ_id: impl Into<String>, kind: AnomalyKind, detail: impl Into<String>) -> Self {
        Self {
            occ_id: occ_id.into(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Sensitivity statistics for one distance threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRow {
    #[serde(rename = "BufferCat")]
    pub threshold: u32,
    #[serde(rename = "TruePos")]
    pub true_positives: u64,
    #[serde(rename = "FalseNeg")]
    pub false_negatives: u64,
    #[serde(rename = "Sensitivity")]
    pub sensitivity: f64,
    #[serde(rename = "nPts")]
    pub sample_size: u64,
    /// Exact one-sided binomial p-value.
    #[serde(rename = "pValue")]
    pub p_value: f64,
    /// `"= 0.1234"` or `"< 0.0001"`.
    #[serde(rename = "pValueDisplay")]
    pub p_value_display: String,
}

/// Buffer Proportion Assessment summary for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BpaSummary {
    #[serde(rename = "SppCode")]
    pub species: String,
    /// Mean habitat proportion in buffers.
    #[serde(rename = "BuffMean")]
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two records.
    #[serde(rename = "BuffSD")]
    pub std_dev: Option<f64>,
    /// Modeled proportion of habitat across the range.
    #[serde(rename = "PropHab")]
    pub expected_proportion: f64,
    #[serde(rename = "nRecs")]
    pub records: u64,
}

/// One species in an evaluation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationListEntry {
    #[serde(rename = "SpeciesCode")]
    pub species: String,
    #[serde(rename = "SciName")]
    pub scientific_name: String,
    #[serde(rename = "PropHab")]
    pub expected_proportion: f64,
}

/// Long-format sensitivity row for the multi-species compile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSensitivity {
    #[serde(rename = "SppCode")]
    pub species: String,
    #[serde(rename = "BufferCat")]
    pub threshold: u32,
    #[serde(rename = "Sensitivity")]
    pub sensitivity: f64,
    #[serde(rename = "nPts")]
    pub sample_size: u64,
}

/// Occurrence store and overlay table record counts for one species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCheck {
    #[serde(rename = "SppCode")]
    pub species: String,
    #[serde(rename = "SciName")]
    pub scientific_name: String,
    /// Occurrences in the store, `None` when no store exists.
    #[serde(rename = "nRecsDB")]
    pub store_records: Option<u64>,
    /// Rows in the overlay table, `None` when no table exists.
    #[serde(rename = "nRecsHS")]
    pub overlay_rows: Option<u64>,
}

/// How a buffer is judged to contain habitat.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PresencePolicy {
    /// At least one habitat cell.
    #[default]
    AnyHabitat,
    /// Habitat proportion at least the expected proportion.
    ProportionAtLeastExpected,
}

/// What to do with occurrences that have no usable uncertainty.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissingUncertaintyPolicy {
    /// Drop the point.
    #[default]
    Exclude,
    /// Buffer at the minimum distance.
    UseMinimum,
}

/// Where occurrences are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OccurrenceSourceConfig {
    /// A CSV table.
    Csv { path: PathBuf },
    /// A directory of per-species `DuckDB` stores.
    Duckdb { dir: PathBuf },
}

/// Configuration for one species evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Species code used in output file names and store lookups.
    pub species: String,
    pub occurrences: OccurrenceSourceConfig,
    /// Habitat GeoTIFF path.
    pub raster: PathBuf,
    /// Raster codes counted as habitat.
    #[serde(default = "default_habitat_codes")]
    pub habitat_codes: Vec<i64>,
    #[serde(default = "default_min_buffer_distance")]
    pub min_buffer_distance: f64,
    /// Modeled proportion of habitat across the species range.
    pub expected_proportion: f64,
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u32>,
    #[serde(default)]
    pub presence: PresencePolicy,
    #[serde(default)]
    pub missing_uncertainty: MissingUncertaintyPolicy,
    /// Keep only the lowest-uncertainty point among identical coordinates.
    #[serde(default)]
    pub dedupe_coordinates: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_habitat_codes() -> Vec<i64> {
    vec![1]
}

const fn default_min_buffer_distance() -> f64 {
    DEFAULT_MIN_BUFFER_DISTANCE
}

fn default_thresholds() -> Vec<u32> {
    DEFAULT_THRESHOLDS.to_vec()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}
