//! Global Names Resolver client.
//!
//! The resolver compiles many name databases and ranks candidate matches
//! with a score; the best-scoring result is reported.

use async_trait::async_trait;

use crate::{HttpContext, ProviderKind, TaxonLookup, TaxonomyError, TaxonomyProvider, retry};

/// Global Names Resolver provider.
pub struct GlobalNamesProvider {
    http: HttpContext,
    base_url: String,
}

impl GlobalNamesProvider {
    /// Creates a provider rooted at `base_url`.
    #[must_use]
    pub fn new(http: HttpContext, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TaxonomyProvider for GlobalNamesProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GlobalNames
    }

    async fn lookup(&self, term: &str) -> Result<TaxonLookup, TaxonomyError> {
        let url = format!("{}/name_resolvers.json", self.base_url);
        let body = retry::send_json(&self.http.policy, || {
            self.http.client.get(&url).query(&[("names", term)])
        })
        .await?;
        parse_response(term, &body)
    }
}

fn parse_response(term: &str, body: &serde_json::Value) -> Result<TaxonLookup, TaxonomyError> {
    let data = body["data"].as_array().ok_or_else(|| TaxonomyError::Parse {
        message: "Global Names response has no 'data' array".to_string(),
    })?;

    let best = data
        .first()
        .and_then(|d| d["results"].as_array())
        .and_then(|results| {
            results.iter().max_by(|a, b| {
                let sa = a["score"].as_f64().unwrap_or(0.0);
                let sb = b["score"].as_f64().unwrap_or(0.0);
                sa.total_cmp(&sb)
            })
        });

    let Some(best) = best else {
        return Ok(TaxonLookup::not_found(ProviderKind::GlobalNames, term));
    };

    let mut lookup = TaxonLookup::found(ProviderKind::GlobalNames, term);
    lookup.id = match &best["taxon_id"] {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    lookup.accepted_name = best["current_name_string"]
        .as_str()
        .or_else(|| best["canonical_form"].as_str())
        .or_else(|| best["name_string"].as_str())
        .map(String::from);

    let mut comment = Vec::new();
    if let Some(source) = best["data_source_title"].as_str() {
        comment.push(format!("source: {source}"));
    }
    if let Some(score) = best["score"].as_f64() {
        comment.push(format!("score: {score:.3}"));
    }
    if !comment.is_empty() {
        lookup.comment = Some(comment.join("; "));
    }

    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_scoring_result() {
        let body = serde_json::json!({ "data": [{
            "supplied_name_string": "Charadrius alexandrinus",
            "is_known_name": true,
            "results": [
                { "data_source_title": "NCBI", "taxon_id": "161622",
                  "canonical_form": "Charadrius alexandrinus", "score": 0.75 },
                { "data_source_title": "Catalogue of Life", "taxon_id": "6WX9R",
                  "canonical_form": "Charadrius alexandrinus",
                  "current_name_string": "Anarhynchus alexandrinus", "score": 0.988 }
            ]
        }]});
        let lookup = parse_response("Charadrius alexandrinus", &body).unwrap();
        assert!(lookup.is_found());
        assert_eq!(lookup.id.as_deref(), Some("6WX9R"));
        assert_eq!(
            lookup.accepted_name.as_deref(),
            Some("Anarhynchus alexandrinus")
        );
        assert_eq!(
            lookup.comment.as_deref(),
            Some("source: Catalogue of Life; score: 0.988")
        );
    }

    #[test]
    fn unknown_name_is_not_found() {
        let body = serde_json::json!({ "data": [{
            "supplied_name_string": "Qwerty uiop", "is_known_name": false
        }]});
        let lookup = parse_response("Qwerty uiop", &body).unwrap();
        assert!(!lookup.is_found());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_response("x", &serde_json::json!({ "status": "failed" })).is_err());
    }
}
