#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `hab_eval` binary.
//!
//! [`StageProgress`] renders one [`Stage`] of work as an `indicatif` bar
//! behind the library-side [`ProgressCallback`] trait. [`init_logger`]
//! routes `log` output through the same [`MultiProgress`] so log lines
//! print above the bars instead of through them.

use std::sync::Arc;
use std::time::Duration;

use hab_eval_occurrence::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub use indicatif::MultiProgress;

/// Module prefix shared by every workspace crate.
const WORKSPACE_TARGET: &str = "hab_eval";

/// A unit of work that reports progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// GBIF occurrence pages for one species.
    Records,
    /// Buffer overlays for one species.
    Buffers,
    /// Species in a multi-species batch.
    Species,
}

impl Stage {
    const fn color(self) -> &'static str {
        match self {
            Self::Records => "cyan",
            Self::Buffers => "yellow",
            Self::Species => "green",
        }
    }

    const fn unit(self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::Buffers => "buffers",
            Self::Species => "species",
        }
    }

    fn spinner_template(self) -> String {
        format!("{{spinner:.{}}} {{msg}}", self.color())
    }

    fn bar_template(self) -> String {
        format!(
            "  {{msg}} {{wide_bar:.{}/dim}} {{pos}}/{{len}} {} {{percent}}% [{{eta}}]",
            self.color(),
            self.unit()
        )
    }

    fn spinner_style(self) -> ProgressStyle {
        ProgressStyle::with_template(&self.spinner_template())
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style(self) -> ProgressStyle {
        ProgressStyle::with_template(&self.bar_template())
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

/// Progress for one [`Stage`].
///
/// Starts as a spinner. The first [`ProgressCallback::set_total`] call
/// turns it into a bar, since GBIF counts and buffer totals are only known
/// once work begins.
pub struct StageProgress {
    bar: ProgressBar,
    stage: Stage,
}

impl StageProgress {
    /// Adds a spinner for `stage` to `multi`.
    #[must_use]
    pub fn start(multi: &MultiProgress, stage: Stage, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(stage.spinner_style());
        bar.set_message(message.to_string());
        Arc::new(Self { bar, stage })
    }
}

impl ProgressCallback for StageProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.stage.bar_style());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        let elapsed = self.bar.elapsed().as_secs_f64();
        self.bar.finish_with_message(format!("{msg} ({elapsed:.1}s)"));
    }
}

/// Installs the global logger behind `indicatif-log-bridge`.
///
/// Workspace crates log at `info` and dependencies at `warn` unless
/// `RUST_LOG` says otherwise. Returns the [`MultiProgress`] that every
/// [`StageProgress`] must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter_level(LevelFilter::Warn)
        .filter_module(WORKSPACE_TARGET, LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_err()
    {
        log::debug!("logger already installed");
    }
    log::set_max_level(level);

    multi
}
