//! Multi-species summaries built from per-species result tables.
//!
//! All three operations are driven by an evaluation list
//! (`SpeciesCode,SciName,PropHab`). Species whose `HabStats` table is
//! missing are logged and skipped rather than failing the batch.

use std::path::Path;

use hab_eval_evaluation_models::{
    BpaSummary, EvaluationListEntry, OverlayStat, PresencePolicy, RecordCheck, SpeciesSensitivity,
};
use hab_eval_occurrence::store::DuckDbOccurrenceStore;
use hab_eval_report::render_bpa;

use crate::EvaluationError;
use crate::export::{hab_stats_path, read_rows, write_rows};
use crate::stats::{bpa_summary, sensitivity};

pub const ALL_SPECIES_BPA_CSV: &str = "All-Species-BPA.csv";
pub const ALL_SPECIES_BPA_SVG: &str = "All-Species-BPA.svg";
pub const ALL_SPECIES_BSM_CSV: &str = "All-Species-BSM.csv";

/// Reads an evaluation list.
///
/// # Errors
///
/// Returns [`EvaluationError`] if the list cannot be read or parsed.
pub fn read_evaluation_list(path: &Path) -> Result<Vec<EvaluationListEntry>, EvaluationError> {
    let entries: Vec<EvaluationListEntry> = read_rows(path)?;
    log::info!("Read {} species from {}", entries.len(), path.display());
    Ok(entries)
}

fn load_stats(
    stats_dir: &Path,
    species: &str,
) -> Result<Option<Vec<OverlayStat>>, EvaluationError> {
    let path = hab_stats_path(stats_dir, species);
    if !path.exists() {
        log::warn!("{species}: {} not found, skipping", path.display());
        return Ok(None);
    }
    read_rows(&path).map(Some)
}

/// Computes a BPA summary for every listed species with results, writes
/// `All-Species-BPA.csv`, and renders the combined scatter.
///
/// # Errors
///
/// Returns [`EvaluationError`] if a table cannot be read or an output
/// cannot be written.
pub fn compile_bpa(
    entries: &[EvaluationListEntry],
    stats_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<BpaSummary>, EvaluationError> {
    let mut summaries = Vec::new();
    for entry in entries {
        let Some(stats) = load_stats(stats_dir, &entry.species)? else {
            continue;
        };
        match bpa_summary(&entry.species, &stats, entry.expected_proportion) {
            Some(summary) => summaries.push(summary),
            None => log::warn!("{}: results table is empty, skipping", entry.species),
        }
    }

    write_rows(&output_dir.join(ALL_SPECIES_BPA_CSV), &summaries)?;
    render_bpa(&output_dir.join(ALL_SPECIES_BPA_SVG), "All Species", &summaries)?;
    log::info!("Compiled BPA for {}/{} species", summaries.len(), entries.len());
    Ok(summaries)
}

/// Recomputes sensitivity for every listed species and writes the long
/// table `All-Species-BSM.csv`.
///
/// # Errors
///
/// Returns [`EvaluationError`] if a table cannot be read or the output
/// cannot be written.
pub fn compile_bsm(
    entries: &[EvaluationListEntry],
    stats_dir: &Path,
    output_dir: &Path,
    thresholds: &[u32],
    policy: PresencePolicy,
) -> Result<Vec<SpeciesSensitivity>, EvaluationError> {
    let mut long = Vec::new();
    let mut compiled = 0usize;
    for entry in entries {
        let Some(stats) = load_stats(stats_dir, &entry.species)? else {
            continue;
        };
        compiled += 1;
        long.extend(
            sensitivity(&stats, thresholds, entry.expected_proportion, policy)
                .into_iter()
                .map(|row| SpeciesSensitivity {
                    species: entry.species.clone(),
                    threshold: row.threshold,
                    sensitivity: row.sensitivity,
                    sample_size: row.sample_size,
                }),
        );
    }

    write_rows(&output_dir.join(ALL_SPECIES_BSM_CSV), &long)?;
    log::info!("Compiled BSM for {compiled}/{} species", entries.len());
    Ok(long)
}

/// Compares stored occurrence counts with overlay table row counts.
///
/// # Errors
///
/// Returns [`EvaluationError`] if an existing store or table cannot be
/// read.
pub fn check_records(
    entries: &[EvaluationListEntry],
    store: &DuckDbOccurrenceStore,
    stats_dir: &Path,
) -> Result<Vec<RecordCheck>, EvaluationError> {
    entries
        .iter()
        .map(|entry| -> Result<RecordCheck, EvaluationError> {
            let store_records = store.count(&entry.species)?;
            let stats_path = hab_stats_path(stats_dir, &entry.species);
            let overlay_rows = if stats_path.exists() {
                Some(read_rows::<OverlayStat>(&stats_path)?.len() as u64)
            } else {
                None
            };
            if store_records.is_none() || overlay_rows.is_none() {
                log::warn!(
                    "{}: store records {store_records:?}, overlay rows {overlay_rows:?}",
                    entry.species
                );
            }
            Ok(RecordCheck {
                species: entry.species.clone(),
                scientific_name: entry.scientific_name.clone(),
                store_records,
                overlay_rows,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use hab_eval_occurrence::store::{open, upsert_occurrences};
    use hab_eval_occurrence_models::OccurrencePoint;

    use super::*;

    fn fresh(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn entry(species: &str, proportion: f64) -> EvaluationListEntry {
        EvaluationListEntry {
            species: species.to_string(),
            scientific_name: format!("{species} sciname"),
            expected_proportion: proportion,
        }
    }

    fn write_stats(dir: &Path, species: &str, rows: &[OverlayStat]) {
        write_rows(&hab_stats_path(dir, species), rows).unwrap();
    }

    #[test]
    fn reads_evaluation_list() {
        let dir = fresh("hab_eval_compile_list_test");
        let path = dir.join("list.csv");
        std::fs::write(
            &path,
            "SpeciesCode,SciName,PropHab\nbhensx,Buteo lineatus,0.12\nmgaprx,Microtus pinetorum,0.4\n",
        )
        .unwrap();
        let entries = read_evaluation_list(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].scientific_name, "Microtus pinetorum");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bpa_compile_skips_missing_species() {
        let dir = fresh("hab_eval_compile_bpa_test");
        write_stats(
            &dir,
            "aaa",
            &[OverlayStat::new("1", 30.0, 2, 2, 0), OverlayStat::new("2", 30.0, 4, 0, 0)],
        );
        let entries = vec![entry("aaa", 0.2), entry("missing", 0.3)];

        let summaries = compile_bpa(&entries, &dir, &dir.join("out")).unwrap();
        assert_eq!(summaries.len(), 1);
        assert!((summaries[0].mean - 0.75).abs() < 1e-12);
        assert_eq!(summaries[0].records, 2);

        let csv = std::fs::read_to_string(dir.join("out").join(ALL_SPECIES_BPA_CSV)).unwrap();
        assert!(csv.starts_with("SppCode,BuffMean,BuffSD,PropHab,nRecs\n"));
        assert!(dir.join("out").join(ALL_SPECIES_BPA_SVG).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bsm_compile_writes_long_table() {
        let dir = fresh("hab_eval_compile_bsm_test");
        write_stats(&dir, "aaa", &[OverlayStat::new("1", 30.0, 1, 0, 0)]);
        write_stats(&dir, "bbb", &[OverlayStat::new("1", 800.0, 0, 5, 0)]);
        let entries = vec![entry("aaa", 0.2), entry("bbb", 0.2)];

        let long = compile_bsm(
            &entries,
            &dir,
            &dir,
            &[30, 1000],
            PresencePolicy::AnyHabitat,
        )
        .unwrap();
        assert_eq!(long.len(), 4);
        assert_eq!(long[0].species, "aaa");
        assert!((long[0].sensitivity - 1.0).abs() < f64::EPSILON);
        assert_eq!(long[2].species, "bbb");
        assert_eq!(long[2].sample_size, 0);
        assert_eq!(long[3].sample_size, 1);
        assert!(long[3].sensitivity.abs() < f64::EPSILON);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn record_check_reports_absent_sources() {
        let dir = fresh("hab_eval_compile_records_test");
        let store = DuckDbOccurrenceStore::new(dir.join("stores"));
        let conn = open(&store.path_for("aaa")).unwrap();
        let points: Vec<OccurrencePoint> = (0..3)
            .map(|i| OccurrencePoint {
                id: i.to_string(),
                longitude: -90.0,
                latitude: 35.0,
                coordinate_uncertainty_m: None,
            })
            .collect();
        upsert_occurrences(&conn, &points).unwrap();
        drop(conn);
        write_stats(&dir, "aaa", &[OverlayStat::new("0", 30.0, 1, 0, 0)]);

        let checks = check_records(&[entry("aaa", 0.1), entry("bbb", 0.1)], &store, &dir).unwrap();
        assert_eq!(checks[0].store_records, Some(3));
        assert_eq!(checks[0].overlay_rows, Some(1));
        assert_eq!(checks[1].store_records, None);
        assert_eq!(checks[1].overlay_rows, None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
