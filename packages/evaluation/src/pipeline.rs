//! One species evaluation, from occurrences to figures.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hab_eval_evaluation_models::{OccurrenceSourceConfig, RunConfig};
use hab_eval_occurrence::OccurrenceSource;
use hab_eval_occurrence::csv_source::CsvOccurrenceSource;
use hab_eval_occurrence::progress::ProgressCallback;
use hab_eval_occurrence::store::DuckDbOccurrenceStore;
use hab_eval_report::{render_bpa, render_bsm};
use hab_eval_spatial::buffer::BufferBuilder;
use hab_eval_spatial::projection::AlbersEqualArea;
use hab_eval_spatial::raster::HabitatRaster;

use crate::EvaluationError;
use crate::export::{OutputPaths, write_rows};
use crate::overlay::{overlay_points, prepare_points};
use crate::stats::{bpa_summary, sensitivity};

/// Counts reported at the end of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub species: String,
    /// Occurrences read from the source.
    pub loaded: usize,
    /// Points that passed screening and were buffered.
    pub buffered: usize,
    pub overlapped: usize,
    pub non_overlapping: usize,
    pub anomalies: usize,
    pub elapsed: Duration,
    pub outputs: OutputPaths,
}

/// Builds the occurrence source named by the configuration.
#[must_use]
pub fn occurrence_source(config: &OccurrenceSourceConfig) -> Box<dyn OccurrenceSource> {
    match config {
        OccurrenceSourceConfig::Csv { path } => Box::new(CsvOccurrenceSource::new(path)),
        OccurrenceSourceConfig::Duckdb { dir } => Box::new(DuckDbOccurrenceStore::new(dir)),
    }
}

/// Runs the full evaluation for the species in `config`.
///
/// The raster is opened before anything else so a bad raster path fails
/// fast. Every output file is overwritten.
///
/// # Errors
///
/// Returns [`EvaluationError`] if the raster or occurrences cannot be
/// loaded, or an output cannot be written.
pub fn run(
    config: &RunConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RunSummary, EvaluationError> {
    let start = Instant::now();
    let species = config.species.as_str();

    let mut raster = HabitatRaster::open(&config.raster)?;

    let points = occurrence_source(&config.occurrences).fetch_occurrences(species)?;
    let loaded = points.len();
    if loaded == 0 {
        log::warn!("{species}: no occurrences found");
    }
    log::info!("{species}: loaded {loaded} occurrences");

    let prepared = prepare_points(points, config.missing_uncertainty, config.dedupe_coordinates);
    let buffered = prepared.accepted.len();

    let builder = BufferBuilder::new(AlbersEqualArea::default(), config.min_buffer_distance);
    let habitat_codes: BTreeSet<i64> = config.habitat_codes.iter().copied().collect();

    progress.set_message(format!("{species}: overlaying buffers"));
    let results = overlay_points(
        &mut raster,
        &builder,
        &prepared.accepted,
        &habitat_codes,
        progress,
    )?;
    drop(raster);

    let mut anomalies = prepared.anomalies;
    anomalies.extend(results.anomalies);

    let rows = sensitivity(
        &results.stats,
        &config.thresholds,
        config.expected_proportion,
        config.presence,
    );

    let outputs = OutputPaths::new(&config.output_dir, species);
    write_rows(&outputs.hab_stats, &results.stats)?;
    write_rows(&outputs.non_overlaps, &results.non_overlaps)?;
    write_rows(&outputs.anomalies, &anomalies)?;
    write_rows(&outputs.sensitivity, &rows)?;

    match bpa_summary(species, &results.stats, config.expected_proportion) {
        Some(summary) => render_bpa(&outputs.bpa_figure, species, &[summary])?,
        None => log::warn!("{species}: no buffers overlapped the raster, skipping BPA figure"),
    }
    render_bsm(&outputs.bsm_figure, species, &rows)?;

    let summary = RunSummary {
        species: species.to_string(),
        loaded,
        buffered,
        overlapped: results.stats.len(),
        non_overlapping: results.non_overlaps.len(),
        anomalies: anomalies.len(),
        elapsed: start.elapsed(),
        outputs,
    };

    log::info!(
        "{species}: {} loaded, {} buffered, {} overlapped, {} non-overlapping, {} anomalies in {:.1}s",
        summary.loaded,
        summary.buffered,
        summary.overlapped,
        summary.non_overlapping,
        summary.anomalies,
        summary.elapsed.as_secs_f64()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;
    use std::path::{Path, PathBuf};

    use hab_eval_evaluation_models::{
        Anomaly, AnomalyKind, MissingUncertaintyPolicy, OverlayStat, PresencePolicy,
        SensitivityRow,
    };
    use hab_eval_occurrence::progress::null_progress;
    use hab_eval_spatial::test_support::{LAT, LON, write_centered_gray8};

    use super::*;
    use crate::export::read_rows;

    fn write_points(dir: &Path) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let mut csv = String::from("occ_id,longitude,latitude,coordinateUncertaintyInMeters\n");
        let uncertainties = [5.0, 10.0, 40.0, 90.0, 150.0, 300.0, 450.0, 600.0];
        for (i, unc) in uncertainties.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let offset = 0.0005 * (i as f64 % 3.0);
            writeln!(csv, "p{i},{},{},{unc}", LON + offset, LAT - offset).unwrap();
        }
        writeln!(csv, "outside,{},{LAT},50", LON + 3.0).unwrap();
        writeln!(csv, "nounc,{LON},{LAT},").unwrap();
        writeln!(csv, "blank,,{LAT},50").unwrap();
        let path = dir.join("points.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    fn config(dir: &Path, raster: PathBuf) -> RunConfig {
        RunConfig {
            species: "testsp".to_string(),
            occurrences: OccurrenceSourceConfig::Csv {
                path: write_points(dir),
            },
            raster,
            habitat_codes: vec![1],
            min_buffer_distance: 30.0,
            expected_proportion: 0.12,
            thresholds: vec![30, 100, 500, 1000],
            presence: PresencePolicy::AnyHabitat,
            missing_uncertainty: MissingUncertaintyPolicy::Exclude,
            dedupe_coordinates: false,
            output_dir: dir.join("out"),
        }
    }

    #[test]
    fn all_habitat_raster_gives_full_sensitivity() {
        let dir = std::env::temp_dir().join("hab_eval_pipeline_all_habitat");
        let _ = std::fs::remove_dir_all(&dir);
        let raster = write_centered_gray8("pipeline_all_one.tif", 100, 100, &[1u8; 10_000], None);

        let summary = run(&config(&dir, raster), &null_progress()).unwrap();
        assert_eq!(summary.loaded, 11);
        assert_eq!(summary.buffered, 9);
        assert_eq!(summary.overlapped, 8);
        assert_eq!(summary.non_overlapping, 1);
        assert_eq!(summary.anomalies, 2);

        let anomalies: Vec<Anomaly> = read_rows(&summary.outputs.anomalies).unwrap();
        let blank = anomalies.iter().find(|a| a.occ_id == "blank").unwrap();
        assert_eq!(blank.kind, AnomalyKind::InvalidCoordinate);

        let stats: Vec<OverlayStat> = read_rows(&summary.outputs.hab_stats).unwrap();
        assert!(
            stats
                .iter()
                .all(|s| (s.habitat_proportion - 1.0).abs() < f64::EPSILON)
        );
        assert!(stats.iter().all(|s| s.occ_id != "outside"));
        assert!((stats[0].buffer_distance - 30.0).abs() < f64::EPSILON);

        let rows: Vec<SensitivityRow> = read_rows(&summary.outputs.sensitivity).unwrap();
        assert_eq!(rows.len(), 4);
        for row in rows.iter().filter(|r| r.sample_size > 0) {
            assert!((row.sensitivity - 1.0).abs() < f64::EPSILON);
        }
        let last = rows.last().unwrap();
        assert_eq!(last.sample_size, 8);
        assert!(last.p_value < 0.0001);
        assert_eq!(last.p_value_display, "< 0.0001");

        assert!(summary.outputs.bpa_figure.exists());
        assert!(summary.outputs.bsm_figure.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn all_zero_raster_gives_only_false_negatives() {
        let dir = std::env::temp_dir().join("hab_eval_pipeline_all_zero");
        let _ = std::fs::remove_dir_all(&dir);
        let raster = write_centered_gray8("pipeline_all_zero.tif", 100, 100, &[0u8; 10_000], None);

        let summary = run(&config(&dir, raster), &null_progress()).unwrap();

        let stats: Vec<OverlayStat> = read_rows(&summary.outputs.hab_stats).unwrap();
        for s in &stats {
            assert_eq!(s.habitat_cells, 0);
            assert_eq!(s.non_habitat_cells, s.total_cells);
        }

        let rows: Vec<SensitivityRow> = read_rows(&summary.outputs.sensitivity).unwrap();
        for row in &rows {
            assert!(row.sensitivity.abs() < f64::EPSILON);
            assert_eq!(row.false_negatives, row.sample_size);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_raster_is_fatal() {
        let dir = std::env::temp_dir().join("hab_eval_pipeline_missing_raster");
        let _ = std::fs::remove_dir_all(&dir);
        let config = config(&dir, dir.join("nope.tif"));
        let err = run(&config, &null_progress()).unwrap_err();
        assert!(matches!(err, EvaluationError::Raster(_)));
        assert!(!config.output_dir.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
