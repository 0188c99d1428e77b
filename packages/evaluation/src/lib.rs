#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Habitat map evaluation pipeline.
//!
//! Loads occurrences for one species, buffers them, overlays the buffers
//! on the habitat raster, aggregates the per-buffer counts into
//! sensitivity buckets, and writes the result tables and figures. The
//! [`compile`] module combines the tables of many species.

pub mod compile;
pub mod config;
pub mod export;
pub mod overlay;
pub mod pipeline;
pub mod stats;

use hab_eval_occurrence::OccurrenceError;
use hab_eval_report::ReportError;
use hab_eval_spatial::RasterError;
use thiserror::Error;

pub use pipeline::{RunSummary, run};

/// Errors that can occur during an evaluation run.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Run configuration could not be parsed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Run configuration is invalid.
    #[error("Invalid config: {message}")]
    Config { message: String },

    /// Loading occurrences failed.
    #[error(transparent)]
    Occurrence(#[from] OccurrenceError),

    /// Opening or reading the habitat raster failed.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Rendering a figure failed.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl EvaluationError {
    fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
