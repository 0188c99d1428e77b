//! Subcommand implementations shared by the flag-driven and interactive
//! entry points.

use std::path::Path;
use std::time::{Duration, Instant};

use hab_eval_cli_utils::{MultiProgress, Stage, StageProgress};
use hab_eval_evaluation::{compile, config, export};
use hab_eval_evaluation_models::{DEFAULT_THRESHOLDS, PresencePolicy};
use hab_eval_occurrence::gbif::{self, DEFAULT_BASE_URL, GbifOccurrenceClient};
use hab_eval_occurrence::store::DuckDbOccurrenceStore;
use hab_eval_taxonomy::retry::{self, RetryPolicy};
use hab_eval_taxonomy::{
    HttpContext, TaxonomyProvider, batch, build_enabled_providers, build_provider,
    service_registry,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn http_context(timeout_secs: u64) -> Result<HttpContext, Box<dyn std::error::Error>> {
    Ok(HttpContext {
        client: retry::build_client(Duration::from_secs(timeout_secs))?,
        policy: RetryPolicy::default(),
    })
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Runs one species evaluation.
pub fn evaluate(multi: &MultiProgress, config_path: &Path) -> CliResult {
    let config = config::load(config_path)?;
    let progress = StageProgress::start(multi, Stage::Buffers, &config.species);
    let summary = hab_eval_evaluation::run(&config, &progress)?;

    println!(
        "{}: {} loaded, {} buffered, {} overlapped, {} outside raster, {} anomalies ({:.1}s)",
        summary.species,
        summary.loaded,
        summary.buffered,
        summary.overlapped,
        summary.non_overlapping,
        summary.anomalies,
        summary.elapsed.as_secs_f64()
    );
    println!("Results written to {}", config.output_dir.display());
    Ok(())
}

/// Compiles the multi-species BPA table and figure.
pub fn compile_bpa(list: &Path, stats_dir: &Path, output_dir: &Path) -> CliResult {
    let entries = compile::read_evaluation_list(list)?;
    let summaries = compile::compile_bpa(&entries, stats_dir, output_dir)?;
    println!(
        "Compiled BPA for {}/{} species into {}",
        summaries.len(),
        entries.len(),
        output_dir.display()
    );
    Ok(())
}

/// Compiles the long-format multi-species sensitivity table.
pub fn compile_bsm(
    list: &Path,
    stats_dir: &Path,
    output_dir: &Path,
    thresholds: Option<Vec<u32>>,
    presence: PresencePolicy,
) -> CliResult {
    let thresholds = thresholds.unwrap_or_else(|| DEFAULT_THRESHOLDS.to_vec());
    if thresholds.is_empty() || thresholds.windows(2).any(|w| w[0] >= w[1]) {
        return Err("thresholds must be non-empty and strictly ascending".into());
    }

    let entries = compile::read_evaluation_list(list)?;
    let rows = compile::compile_bsm(&entries, stats_dir, output_dir, &thresholds, presence)?;
    println!(
        "Wrote {} sensitivity rows to {}",
        rows.len(),
        output_dir.join(compile::ALL_SPECIES_BSM_CSV).display()
    );
    Ok(())
}

/// Writes the store vs overlay table record check.
pub fn check_records(list: &Path, store_dir: &Path, stats_dir: &Path, output: &Path) -> CliResult {
    let entries = compile::read_evaluation_list(list)?;
    let store = DuckDbOccurrenceStore::new(store_dir);
    let checks = compile::check_records(&entries, &store, stats_dir)?;
    export::write_rows(output, &checks)?;

    let mismatched = checks
        .iter()
        .filter(|c| c.store_records.is_none() || c.store_records != c.overlay_rows)
        .count();
    println!(
        "Checked {} species ({mismatched} with missing or differing counts), wrote {}",
        checks.len(),
        output.display()
    );
    Ok(())
}

/// Looks up every name in `input` against the selected taxonomy services.
pub async fn taxonomy(
    input: &Path,
    output: &Path,
    services: Option<&[String]>,
    timeout_secs: u64,
) -> CliResult {
    let http = http_context(timeout_secs)?;
    let providers: Vec<Box<dyn TaxonomyProvider>> = match services {
        None => build_enabled_providers(&http),
        Some(ids) => {
            let mut providers = Vec::new();
            for service in service_registry::select_services(ids)? {
                providers.push(build_provider(&service, &http)?);
            }
            providers
        }
    };
    if providers.is_empty() {
        return Err("no taxonomy services available".into());
    }

    let terms = batch::read_terms(input)?;
    let start = Instant::now();
    let (lookups, summary) = batch::lookup_species(&providers, &terms).await;

    ensure_parent(output)?;
    batch::write_csv(output, &lookups)?;
    println!(
        "{} names x {} services: {} found, {} not found, {} failed ({:.1}s). Wrote {}",
        terms.len(),
        providers.len(),
        summary.found,
        summary.not_found,
        summary.failed,
        start.elapsed().as_secs_f64(),
        output.display()
    );
    Ok(())
}

/// Counts GBIF records for every name in `input`.
pub async fn gbif_counts(
    multi: &MultiProgress,
    input: &Path,
    output: &Path,
    country: &str,
    timeout_secs: u64,
) -> CliResult {
    let names = batch::read_terms(input)?;
    let client = GbifOccurrenceClient::new(
        http_context(timeout_secs)?,
        DEFAULT_BASE_URL,
        Some(country.to_string()),
    );

    let progress = StageProgress::start(multi, Stage::Species, "GBIF record counts");
    let counts = client.record_counts(&names, &progress).await;

    ensure_parent(output)?;
    gbif::write_record_counts(output, &counts)?;
    let unknown = counts.iter().filter(|c| c.record_count.is_none()).count();
    println!(
        "Counted {} names ({unknown} unknown), wrote {}",
        counts.len(),
        output.display()
    );
    Ok(())
}

/// Summarizes GBIF record completeness for every name in `input`.
pub async fn gbif_summary(
    multi: &MultiProgress,
    input: &Path,
    output: &Path,
    country: &str,
    timeout_secs: u64,
) -> CliResult {
    let names = batch::read_terms(input)?;
    let client = GbifOccurrenceClient::new(
        http_context(timeout_secs)?,
        DEFAULT_BASE_URL,
        Some(country.to_string()),
    );

    let progress = StageProgress::start(multi, Stage::Species, "GBIF record summaries");
    let summaries = client.summaries(&names, &progress).await;

    ensure_parent(output)?;
    gbif::write_summaries(output, &summaries)?;
    println!(
        "Summarized {}/{} names ({} failed), wrote {}",
        summaries.len(),
        names.len(),
        names.len() - summaries.len(),
        output.display()
    );
    Ok(())
}

/// Downloads GBIF occurrences for one species into its store.
pub async fn gbif_download(
    multi: &MultiProgress,
    species: &str,
    name: &str,
    store_dir: &Path,
    country: &str,
    timeout_secs: u64,
) -> CliResult {
    if !config::is_valid_species_code(species) {
        return Err(format!("invalid species code {species:?}").into());
    }
    let client = GbifOccurrenceClient::new(
        http_context(timeout_secs)?,
        DEFAULT_BASE_URL,
        Some(country.to_string()),
    );

    let progress = StageProgress::start(multi, Stage::Records, name);
    let (taxon_key, points) = client.download(name, &progress).await?;

    let store = DuckDbOccurrenceStore::new(store_dir);
    let total = store.save(species, name, taxon_key, &points)?;
    println!(
        "{species}: downloaded {} records, {total} in {}",
        points.len(),
        store.path_for(species).display()
    );
    Ok(())
}

/// Prints every configured taxonomy service.
pub fn list_providers() {
    let services = service_registry::all_services();
    println!("{:<14} {:<8} {:<9} BASE URL", "ID", "ENABLED", "PRIORITY");
    println!("{}", "-".repeat(72));
    for service in &services {
        println!(
            "{:<14} {:<8} {:<9} {}",
            service.id,
            service.enabled,
            service.priority,
            service.base_url()
        );
    }
}
