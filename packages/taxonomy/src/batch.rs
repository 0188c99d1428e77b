//! Batch lookups across providers.
//!
//! Species are processed one at a time and each provider is queried in
//! priority order. A provider error becomes a `Failed` row for that
//! (species, provider) pair and the batch moves on.

use std::path::Path;

use crate::{LookupStatus, TaxonLookup, TaxonomyError, TaxonomyProvider};

/// Totals for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Lookups that found a match.
    pub found: u64,
    /// Lookups answered without a match.
    pub not_found: u64,
    /// Lookups that failed and were skipped.
    pub failed: u64,
}

impl BatchSummary {
    fn record(&mut self, status: LookupStatus) {
        match status {
            LookupStatus::Found => self.found += 1,
            LookupStatus::NotFound => self.not_found += 1,
            LookupStatus::Failed => self.failed += 1,
        }
    }
}

/// Looks up every term with every provider.
///
/// Results are ordered by term, then by provider order.
pub async fn lookup_species(
    providers: &[Box<dyn TaxonomyProvider>],
    terms: &[String],
) -> (Vec<TaxonLookup>, BatchSummary) {
    let mut results = Vec::with_capacity(terms.len() * providers.len());
    let mut summary = BatchSummary::default();

    for (i, term) in terms.iter().enumerate() {
        log::info!("[{}/{}] Looking up {term}", i + 1, terms.len());

        for provider in providers {
            let kind = provider.kind();
            let lookup = match provider.lookup(term).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    log::warn!("  [{kind}] lookup failed for {term}: {e}");
                    TaxonLookup::failed(kind, term, e.to_string())
                }
            };
            log::debug!("  [{kind}] {term}: {}", lookup.status);
            summary.record(lookup.status);
            results.push(lookup);
        }
    }

    log::info!(
        "Taxonomy lookups complete: {} found, {} not found, {} failed",
        summary.found,
        summary.not_found,
        summary.failed
    );

    (results, summary)
}

/// Reads search terms from a text file, one per line.
///
/// Blank lines and lines starting with `#` are ignored.
///
/// # Errors
///
/// Returns [`TaxonomyError::Io`] if the file cannot be read.
pub fn read_terms(path: &Path) -> Result<Vec<String>, TaxonomyError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Writes lookup results to a CSV file, overwriting any existing file.
///
/// # Errors
///
/// Returns [`TaxonomyError`] if the file cannot be written.
pub fn write_csv(path: &Path, lookups: &[TaxonLookup]) -> Result<(), TaxonomyError> {
    let mut writer = csv::Writer::from_path(path)?;
    for lookup in lookups {
        writer.serialize(lookup)?;
    }
    writer.flush()?;
    Ok(())
}
