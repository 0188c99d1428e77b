#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Species occurrence record types.
//!
//! An occurrence is a single observation of a species at a geographic
//! location, with an optional positional error radius. These records are
//! the input to buffer construction and are never mutated after loading.

use serde::{Deserialize, Serialize};

/// A single species occurrence in WGS84 geographic coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrencePoint {
    /// Source record identifier (e.g. the GBIF `gbifID`).
    #[serde(rename = "occ_id")]
    pub id: String,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Reported positional error radius in meters.
    #[serde(rename = "coordinateUncertaintyInMeters")]
    pub coordinate_uncertainty_m: Option<f64>,
}

impl OccurrencePoint {
    /// Returns `true` if the longitude and latitude are finite and within
    /// geographic bounds.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }

    /// Returns the coordinate uncertainty if it is usable.
    ///
    /// Negative and non-finite values are reported as missing.
    #[must_use]
    pub fn uncertainty(&self) -> Option<f64> {
        self.coordinate_uncertainty_m
            .filter(|u| u.is_finite() && *u >= 0.0)
    }
}

/// Number of GBIF occurrence records available for one species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    /// Scientific name that was searched.
    pub scientific_name: String,
    /// GBIF backbone taxon key, if the name resolved.
    pub taxon_key: Option<u64>,
    /// Record count, or `None` when GBIF did not report one.
    pub record_count: Option<u64>,
}

/// Data-quality summary of the GBIF records available for one species.
///
/// List columns hold distinct values in first-seen order, joined with
/// `"; "`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceSummary {
    #[serde(rename = "SppName")]
    pub scientific_name: String,
    #[serde(rename = "nRecords")]
    pub records: u64,
    #[serde(rename = "nCoordUncty")]
    pub with_uncertainty: u64,
    #[serde(rename = "minCoordUncty")]
    pub min_uncertainty_m: Option<f64>,
    #[serde(rename = "maxCoordUncty")]
    pub max_uncertainty_m: Option<f64>,
    #[serde(rename = "meanCoordUncty")]
    pub mean_uncertainty_m: Option<f64>,
    /// Distinct `basisOfRecord` values.
    #[serde(rename = "RecordBasis")]
    pub basis_of_record: String,
    /// Filled locality and remark fields, summed over all records.
    #[serde(rename = "nTextDesc")]
    pub text_descriptions: u64,
    #[serde(rename = "nGeoDatum")]
    pub with_geodetic_datum: u64,
    #[serde(rename = "nMonth")]
    pub with_month: u64,
    #[serde(rename = "nYear")]
    pub with_year: u64,
    #[serde(rename = "nSciNameRecs")]
    pub with_scientific_name: u64,
    #[serde(rename = "nComNameRecs")]
    pub with_common_name: u64,
    #[serde(rename = "ComNames")]
    pub common_names: String,
    #[serde(rename = "TaxRanks")]
    pub taxon_ranks: String,
    #[serde(rename = "TaxStatuses")]
    pub taxonomic_statuses: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lon: f64, lat: f64, unc: Option<f64>) -> OccurrencePoint {
        OccurrencePoint {
            id: "1".to_string(),
            longitude: lon,
            latitude: lat,
            coordinate_uncertainty_m: unc,
        }
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(point(-96.0, 40.0, None).has_valid_coordinates());
        assert!(!point(-196.0, 40.0, None).has_valid_coordinates());
        assert!(!point(-96.0, f64::NAN, None).has_valid_coordinates());
    }

    #[test]
    fn negative_uncertainty_is_missing() {
        assert_eq!(point(0.0, 0.0, Some(-1.0)).uncertainty(), None);
        assert_eq!(point(0.0, 0.0, Some(f64::NAN)).uncertainty(), None);
        assert_eq!(point(0.0, 0.0, Some(12.5)).uncertainty(), Some(12.5));
    }
}
