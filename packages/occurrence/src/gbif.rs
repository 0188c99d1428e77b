//! GBIF occurrence search client.
//!
//! Names are resolved to a backbone taxon key first, then
//! `occurrence/search` is queried with `hasCoordinate=true`,
//! `hasGeospatialIssue=false` and an optional country filter. Record counts
//! use `limit=0`; downloads and summaries page through results 300 at a
//! time until GBIF reports `endOfRecords`.
//!
//! See <https://techdocs.gbif.org/en/openapi/v1/occurrence>

use std::path::Path;
use std::sync::Arc;

use hab_eval_taxonomy::HttpContext;
use hab_eval_taxonomy::gbif::match_backbone;
use hab_eval_taxonomy::retry;

use crate::progress::{ProgressCallback, null_progress};
use crate::summary::{RecordAttributes, SummaryBuilder};
use crate::{OccurrenceError, OccurrencePoint, OccurrenceSummary, RecordCount};

/// Records per `occurrence/search` page.
pub const PAGE_SIZE: u64 = 300;

/// GBIF refuses search offsets beyond this; larger sets need the download API.
const MAX_OFFSET: u64 = 100_000;

/// Default GBIF API root.
pub const DEFAULT_BASE_URL: &str = "https://api.gbif.org/v1";

/// Client for GBIF occurrence counts and paged retrieval.
pub struct GbifOccurrenceClient {
    http: HttpContext,
    base_url: String,
    country: Option<String>,
}

/// One parsed page of search results.
#[derive(Debug, Default)]
struct Page {
    points: Vec<OccurrencePoint>,
    records: Vec<RecordAttributes>,
    returned: u64,
    without_coordinates: u64,
    end_of_records: bool,
    count: Option<u64>,
}

impl GbifOccurrenceClient {
    /// Creates a client rooted at `base_url`, restricting searches to
    /// `country` (ISO 3166 alpha-2) when given.
    #[must_use]
    pub fn new(http: HttpContext, base_url: &str, country: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            country,
        }
    }

    async fn taxon_key(&self, name: &str) -> Result<Option<u64>, OccurrenceError> {
        let matched =
            match_backbone(&self.http.client, &self.http.policy, &self.base_url, name).await?;
        Ok(matched.map(|m| m.accepted_usage_key.unwrap_or(m.usage_key)))
    }

    async fn resolve(&self, name: &str) -> Result<u64, OccurrenceError> {
        self.taxon_key(name)
            .await?
            .ok_or_else(|| OccurrenceError::UnknownTaxon {
                name: name.to_string(),
            })
    }

    async fn search(&self, taxon_key: u64, limit: u64, offset: u64) -> Result<Page, OccurrenceError> {
        let url = format!("{}/occurrence/search", self.base_url);
        let mut query = vec![
            ("taxonKey", taxon_key.to_string()),
            ("hasCoordinate", "true".to_string()),
            ("hasGeospatialIssue", "false".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(country) = &self.country {
            query.push(("country", country.clone()));
        }

        let body =
            retry::send_json(&self.http.policy, || self.http.client.get(&url).query(&query))
                .await?;
        parse_page(&body)
    }

    /// Returns the number of georeferenced records for `name`.
    ///
    /// Unresolved names and missing counts are reported as `None` fields
    /// rather than errors.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError`] if a request fails.
    pub async fn record_count(&self, name: &str) -> Result<RecordCount, OccurrenceError> {
        let Some(taxon_key) = self.taxon_key(name).await? else {
            log::warn!("{name} did not match a GBIF backbone species");
            return Ok(RecordCount {
                scientific_name: name.to_string(),
                taxon_key: None,
                record_count: None,
            });
        };

        let page = self.search(taxon_key, 0, 0).await?;
        match page.count {
            Some(n) => log::info!("  {name} has {n} records"),
            None => log::warn!("  {name} has an unknown record count"),
        }

        Ok(RecordCount {
            scientific_name: name.to_string(),
            taxon_key: Some(taxon_key),
            record_count: page.count,
        })
    }

    /// Counts records for every name, one at a time.
    ///
    /// A failed lookup is logged and reported with unknown counts.
    pub async fn record_counts(
        &self,
        names: &[String],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Vec<RecordCount> {
        progress.set_total(names.len() as u64);
        let mut counts = Vec::with_capacity(names.len());

        for name in names {
            progress.set_message(name.clone());
            let count = match self.record_count(name).await {
                Ok(count) => count,
                Err(e) => {
                    log::error!("Record count failed for {name}: {e}");
                    RecordCount {
                        scientific_name: name.clone(),
                        taxon_key: None,
                        record_count: None,
                    }
                }
            };
            counts.push(count);
            progress.inc(1);
        }

        progress.finish(format!("Counted records for {} species", names.len()));
        counts
    }

    /// Pages through every search result for `taxon_key`, handing each
    /// page to `visit`.
    async fn walk_pages(
        &self,
        name: &str,
        taxon_key: u64,
        progress: &Arc<dyn ProgressCallback>,
        mut visit: impl FnMut(Page),
    ) -> Result<(), OccurrenceError> {
        let mut offset = 0u64;

        loop {
            let page = self.search(taxon_key, PAGE_SIZE, offset).await?;

            if offset == 0 {
                match page.count {
                    Some(n) => progress.set_total(n),
                    None => log::warn!("GBIF reports an unknown record count for {name}"),
                }
            }

            progress.inc(page.returned);
            offset += page.returned;
            let last = page.end_of_records || page.returned == 0;
            visit(page);

            if last {
                break;
            }
            if offset >= MAX_OFFSET {
                log::warn!(
                    "Stopped {name} at the GBIF search paging limit ({MAX_OFFSET} records)"
                );
                break;
            }
        }

        Ok(())
    }

    /// Retrieves every georeferenced record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError::UnknownTaxon`] if the name does not
    /// resolve, or another [`OccurrenceError`] if a page request fails.
    pub async fn download(
        &self,
        name: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<(u64, Vec<OccurrencePoint>), OccurrenceError> {
        let taxon_key = self.resolve(name).await?;
        log::info!("Downloading GBIF occurrences for {name} (taxon key {taxon_key})");

        let mut points = Vec::new();
        let mut without_coordinates = 0u64;
        self.walk_pages(name, taxon_key, progress, |page| {
            without_coordinates += page.without_coordinates;
            points.extend(page.points);
        })
        .await?;

        if without_coordinates > 0 {
            log::warn!("Dropped {without_coordinates} {name} records without usable coordinates");
        }
        progress.finish(format!("{name}: {} records", points.len()));

        Ok((taxon_key, points))
    }

    /// Summarizes the completeness of every georeferenced record for
    /// `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError::UnknownTaxon`] if the name does not
    /// resolve, or another [`OccurrenceError`] if a page request fails.
    pub async fn summarize(&self, name: &str) -> Result<OccurrenceSummary, OccurrenceError> {
        let taxon_key = self.resolve(name).await?;

        let mut builder = SummaryBuilder::default();
        self.walk_pages(name, taxon_key, &null_progress(), |page| {
            for record in &page.records {
                builder.add(record);
            }
        })
        .await?;

        let summary = builder.finish(name);
        log::info!("  {name}: summarized {} records", summary.records);
        Ok(summary)
    }

    /// Summarizes every name, one at a time.
    ///
    /// A name that fails to resolve or download is logged and left out.
    pub async fn summaries(
        &self,
        names: &[String],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Vec<OccurrenceSummary> {
        progress.set_total(names.len() as u64);
        let mut summaries = Vec::with_capacity(names.len());

        for name in names {
            progress.set_message(name.clone());
            match self.summarize(name).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => log::error!("Summary failed for {name}, moving on: {e}"),
            }
            progress.inc(1);
        }

        progress.finish(format!(
            "Summarized {}/{} species",
            summaries.len(),
            names.len()
        ));
        summaries
    }
}

/// Parses an `occurrence/search` response page.
fn parse_page(body: &serde_json::Value) -> Result<Page, OccurrenceError> {
    let results = body["results"]
        .as_array()
        .ok_or_else(|| OccurrenceError::Parse {
            message: "GBIF occurrence response has no 'results' array".to_string(),
        })?;

    let mut page = Page {
        returned: results.len() as u64,
        end_of_records: body["endOfRecords"].as_bool().unwrap_or(true),
        count: body["count"].as_u64(),
        ..Page::default()
    };

    for record in results {
        page.records.push(RecordAttributes::from_json(record));
        match parse_record(record) {
            Some(point) => page.points.push(point),
            None => page.without_coordinates += 1,
        }
    }

    Ok(page)
}

fn parse_record(record: &serde_json::Value) -> Option<OccurrencePoint> {
    let id = match (&record["gbifID"], &record["key"]) {
        (serde_json::Value::String(s), _) => s.clone(),
        (serde_json::Value::Number(n), _) | (_, serde_json::Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    Some(OccurrencePoint {
        id,
        longitude: record["decimalLongitude"].as_f64()?,
        latitude: record["decimalLatitude"].as_f64()?,
        coordinate_uncertainty_m: record["coordinateUncertaintyInMeters"].as_f64(),
    })
}

/// Writes record counts to a CSV file, overwriting any existing file.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the file cannot be written.
pub fn write_record_counts(path: &Path, counts: &[RecordCount]) -> Result<(), OccurrenceError> {
    let mut writer = csv::Writer::from_path(path)?;
    for count in counts {
        writer.serialize(count)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes occurrence summaries to a CSV file, overwriting any existing
/// file.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the file cannot be written.
pub fn write_summaries(path: &Path, summaries: &[OccurrenceSummary]) -> Result<(), OccurrenceError> {
    let mut writer = csv::Writer::from_path(path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    Ok(())
}
