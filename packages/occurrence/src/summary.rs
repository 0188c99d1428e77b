//! Per-species tallies of GBIF record completeness.
//!
//! Each search result is reduced to the handful of fields that say how
//! usable a record is ([`RecordAttributes`]), and [`SummaryBuilder`] folds
//! those into one [`OccurrenceSummary`] row per species.

use crate::OccurrenceSummary;

/// Free-text location fields counted towards `nTextDesc`.
const TEXT_FIELDS: [&str; 4] = ["eventRemarks", "locality", "locationRemarks", "occurrenceRemarks"];

const LIST_SEPARATOR: &str = "; ";

/// The fields of one occurrence record that the summary tallies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordAttributes {
    pub species: Option<String>,
    pub vernacular_name: Option<String>,
    pub coordinate_uncertainty_m: Option<f64>,
    pub geodetic_datum: Option<String>,
    /// How many of the four free-text location fields are filled.
    pub text_descriptions: u64,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub basis_of_record: Option<String>,
    pub taxon_rank: Option<String>,
    pub taxonomic_status: Option<String>,
}

fn text(record: &serde_json::Value, field: &str) -> Option<String> {
    record[field]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl RecordAttributes {
    /// Reads the tallied fields from an `occurrence/search` result.
    #[must_use]
    pub fn from_json(record: &serde_json::Value) -> Self {
        Self {
            species: text(record, "species"),
            vernacular_name: text(record, "vernacularName"),
            coordinate_uncertainty_m: record["coordinateUncertaintyInMeters"]
                .as_f64()
                .filter(|u| u.is_finite()),
            geodetic_datum: text(record, "geodeticDatum"),
            text_descriptions: TEXT_FIELDS
                .iter()
                .filter(|f| text(record, f).is_some())
                .count() as u64,
            year: record["year"].as_i64(),
            month: record["month"].as_i64(),
            basis_of_record: text(record, "basisOfRecord"),
            taxon_rank: text(record, "taxonRank"),
            taxonomic_status: text(record, "taxonomicStatus"),
        }
    }
}

fn push_distinct(values: &mut Vec<String>, value: Option<&String>) {
    if let Some(value) = value
        && !values.contains(value)
    {
        values.push(value.clone());
    }
}

/// Accumulates [`RecordAttributes`] into an [`OccurrenceSummary`].
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    records: u64,
    with_uncertainty: u64,
    uncertainty_sum: f64,
    min_uncertainty: Option<f64>,
    max_uncertainty: Option<f64>,
    basis_of_record: Vec<String>,
    text_descriptions: u64,
    with_geodetic_datum: u64,
    with_month: u64,
    with_year: u64,
    with_scientific_name: u64,
    with_common_name: u64,
    common_names: Vec<String>,
    taxon_ranks: Vec<String>,
    taxonomic_statuses: Vec<String>,
}

impl SummaryBuilder {
    /// Adds one record.
    pub fn add(&mut self, record: &RecordAttributes) {
        self.records += 1;

        if let Some(u) = record.coordinate_uncertainty_m {
            self.with_uncertainty += 1;
            self.uncertainty_sum += u;
            self.min_uncertainty = Some(self.min_uncertainty.map_or(u, |m| m.min(u)));
            self.max_uncertainty = Some(self.max_uncertainty.map_or(u, |m| m.max(u)));
        }

        self.text_descriptions += record.text_descriptions;
        self.with_geodetic_datum += u64::from(record.geodetic_datum.is_some());
        self.with_month += u64::from(record.month.is_some());
        self.with_year += u64::from(record.year.is_some());
        self.with_scientific_name += u64::from(record.species.is_some());
        self.with_common_name += u64::from(record.vernacular_name.is_some());

        push_distinct(&mut self.basis_of_record, record.basis_of_record.as_ref());
        push_distinct(&mut self.common_names, record.vernacular_name.as_ref());
        push_distinct(&mut self.taxon_ranks, record.taxon_rank.as_ref());
        push_distinct(&mut self.taxonomic_statuses, record.taxonomic_status.as_ref());
    }

    /// Returns the summary row for `scientific_name`.
    #[must_use]
    pub fn finish(self, scientific_name: &str) -> OccurrenceSummary {
        #[allow(clippy::cast_precision_loss)]
        let mean = (self.with_uncertainty > 0)
            .then(|| self.uncertainty_sum / self.with_uncertainty as f64);

        OccurrenceSummary {
            scientific_name: scientific_name.to_string(),
            records: self.records,
            with_uncertainty: self.with_uncertainty,
            min_uncertainty_m: self.min_uncertainty,
            max_uncertainty_m: self.max_uncertainty,
            mean_uncertainty_m: mean,
            basis_of_record: self.basis_of_record.join(LIST_SEPARATOR),
            text_descriptions: self.text_descriptions,
            with_geodetic_datum: self.with_geodetic_datum,
            with_month: self.with_month,
            with_year: self.with_year,
            with_scientific_name: self.with_scientific_name,
            with_common_name: self.with_common_name,
            common_names: self.common_names.join(LIST_SEPARATOR),
            taxon_ranks: self.taxon_ranks.join(LIST_SEPARATOR),
            taxonomic_statuses: self.taxonomic_statuses.join(LIST_SEPARATOR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<RecordAttributes> {
        [
            serde_json::json!({
                "species": "Blarina carolinensis", "vernacularName": "Southern Short-tailed Shrew",
                "coordinateUncertaintyInMeters": 30.0, "geodeticDatum": "WGS84",
                "locality": "Congaree NP", "occurrenceRemarks": "roadkill",
                "year": 2016, "month": 5, "basisOfRecord": "HUMAN_OBSERVATION",
                "taxonRank": "SPECIES", "taxonomicStatus": "ACCEPTED"
            }),
            serde_json::json!({
                "species": "Blarina carolinensis", "coordinateUncertaintyInMeters": 1000.0,
                "eventRemarks": "  ", "year": 1954, "basisOfRecord": "PRESERVED_SPECIMEN",
                "taxonRank": "SPECIES", "taxonomicStatus": "ACCEPTED"
            }),
            serde_json::json!({
                "vernacularName": "Southern Short-tailed Shrew", "geodeticDatum": "WGS84",
                "basisOfRecord": "HUMAN_OBSERVATION", "taxonRank": "SUBSPECIES",
                "taxonomicStatus": "SYNONYM"
            }),
        ]
        .iter()
        .map(RecordAttributes::from_json)
        .collect()
    }

    #[test]
    fn reads_record_attributes() {
        let first = &records()[0];
        assert_eq!(first.species.as_deref(), Some("Blarina carolinensis"));
        assert_eq!(first.coordinate_uncertainty_m, Some(30.0));
        assert_eq!(first.text_descriptions, 2);
        assert_eq!(first.month, Some(5));

        let blank_remark = &records()[1];
        assert_eq!(blank_remark.text_descriptions, 0);
        assert_eq!(blank_remark.vernacular_name, None);
    }

    #[test]
    fn summarizes_counts_and_distinct_values() {
        let mut builder = SummaryBuilder::default();
        for record in &records() {
            builder.add(record);
        }
        let summary = builder.finish("Blarina carolinensis");

        assert_eq!(summary.records, 3);
        assert_eq!(summary.with_uncertainty, 2);
        assert_eq!(summary.min_uncertainty_m, Some(30.0));
        assert_eq!(summary.max_uncertainty_m, Some(1000.0));
        assert!((summary.mean_uncertainty_m.unwrap() - 515.0).abs() < 1e-9);
        assert_eq!(summary.basis_of_record, "HUMAN_OBSERVATION; PRESERVED_SPECIMEN");
        assert_eq!(summary.text_descriptions, 2);
        assert_eq!(summary.with_geodetic_datum, 2);
        assert_eq!(summary.with_month, 1);
        assert_eq!(summary.with_year, 2);
        assert_eq!(summary.with_scientific_name, 2);
        assert_eq!(summary.with_common_name, 2);
        assert_eq!(summary.common_names, "Southern Short-tailed Shrew");
        assert_eq!(summary.taxon_ranks, "SPECIES; SUBSPECIES");
        assert_eq!(summary.taxonomic_statuses, "ACCEPTED; SYNONYM");
    }

    #[test]
    fn no_records_gives_empty_summary() {
        let summary = SummaryBuilder::default().finish("Nomen nudum");
        assert_eq!(summary.records, 0);
        assert_eq!(summary.with_uncertainty, 0);
        assert_eq!(summary.mean_uncertainty_m, None);
        assert_eq!(summary.min_uncertainty_m, None);
        assert!(summary.basis_of_record.is_empty());
    }
}
