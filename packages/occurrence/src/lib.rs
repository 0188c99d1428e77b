#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Species occurrence loading and retrieval.
//!
//! Occurrences come from one of two local stores behind the
//! [`OccurrenceSource`] trait:
//!
//! - [`csv_source::CsvOccurrenceSource`]: a flat table with
//!   `occ_id,longitude,latitude,coordinateUncertaintyInMeters` columns.
//! - [`store::DuckDbOccurrenceStore`]: one `DuckDB` file per species with an
//!   `occurrences` table, filled by [`gbif::GbifOccurrenceClient`].
//!
//! The same client also summarizes record completeness per species
//! ([`summary`]).

pub mod csv_source;
pub mod gbif;
pub mod progress;
pub mod store;
pub mod summary;

pub use hab_eval_occurrence_models::{OccurrencePoint, OccurrenceSummary, RecordCount};
use hab_eval_taxonomy::TaxonomyError;
use thiserror::Error;

/// Errors from occurrence loading and retrieval.
#[derive(Debug, Error)]
pub enum OccurrenceError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// GBIF request failed.
    #[error("GBIF request failed: {0}")]
    Http(#[from] TaxonomyError),

    /// The occurrence store for a species does not exist.
    #[error("No occurrence store for {species} at {path}")]
    MissingStore {
        /// Species whose store was requested.
        species: String,
        /// Expected store path.
        path: String,
    },

    /// A scientific name did not resolve to a GBIF backbone taxon.
    #[error("{name} did not match a GBIF backbone species")]
    UnknownTaxon {
        /// The unresolved name.
        name: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// A store that can list the occurrences recorded for a species.
pub trait OccurrenceSource {
    /// Returns every stored occurrence for `species`, in storage order.
    ///
    /// Records are returned as stored; coordinate and uncertainty
    /// validation is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError`] if the store cannot be read.
    fn fetch_occurrences(&self, species: &str) -> Result<Vec<OccurrencePoint>, OccurrenceError>;
}
