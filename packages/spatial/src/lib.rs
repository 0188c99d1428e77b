#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Planar geometry for habitat overlays.
//!
//! Occurrence points are projected to CONUS Albers ([`projection`]),
//! buffered into circles ([`buffer`]), and used to mask a categorical
//! GeoTIFF habitat raster ([`raster`]).

pub mod buffer;
pub mod projection;
pub mod raster;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use thiserror::Error;

/// Errors from opening or reading a habitat raster.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The raster file could not be opened.
    #[error("Cannot open raster {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TIFF decoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Georeferencing tags are missing or invalid.
    #[error("Invalid georeferencing: {message}")]
    Georeference { message: String },

    /// The raster layout or sample type is not supported.
    #[error("Unsupported raster: {message}")]
    Unsupported { message: String },
}
