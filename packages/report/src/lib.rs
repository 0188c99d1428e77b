#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Evaluation plots rendered as SVG.
//!
//! Both renderers take already-computed values and never recompute
//! statistics. SVG output keeps rendering free of system font
//! dependencies. Existing files are overwritten.

pub mod bpa;
pub mod bsm;

use std::path::Path;

use thiserror::Error;

pub use bpa::render_bpa;
pub use bsm::render_bsm;

/// Errors from plot rendering.
#[derive(Debug, Error)]
pub enum ReportError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Drawing failed.
    #[error("Plot error: {message}")]
    Plot { message: String },
}

impl ReportError {
    fn plot(e: impl std::fmt::Display) -> Self {
        Self::Plot {
            message: e.to_string(),
        }
    }
}

/// Creates the parent directory of `path` if needed.
fn ensure_parent(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
