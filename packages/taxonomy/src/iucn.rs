//! IUCN Red List v3 API client.
//!
//! The species endpoint resolves the name. Country occurrence and the
//! species narrative are secondary lookups: when either fails the result
//! is still reported as found, with those fields left empty.
//!
//! The IUCN API cannot be searched by common name.

use async_trait::async_trait;

use crate::markup::strip_html;
use crate::{
    HttpContext, ProviderKind, TaxonLookup, TaxonomyError, TaxonomyProvider, join_path, retry,
};

/// IUCN Red List provider.
pub struct IucnProvider {
    http: HttpContext,
    base_url: String,
    token: String,
}

impl IucnProvider {
    /// Creates a provider rooted at `base_url` using the API `token`.
    #[must_use]
    pub fn new(http: HttpContext, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            token: token.to_string(),
        }
    }

    async fn get(&self, segments: &[&str]) -> Result<serde_json::Value, TaxonomyError> {
        let url = join_path(&self.base_url, segments)?;
        retry::send_json(&self.http.policy, || {
            self.http
                .client
                .get(url.clone())
                .query(&[("token", self.token.as_str())])
        })
        .await
    }
}

#[async_trait]
impl TaxonomyProvider for IucnProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Iucn
    }

    async fn lookup(&self, term: &str) -> Result<TaxonLookup, TaxonomyError> {
        let species = self.get(&["species", term]).await?;
        let Some(mut lookup) = parse_species(term, &species) else {
            return Ok(TaxonLookup::not_found(ProviderKind::Iucn, term));
        };

        match self.get(&["species", "countries", "name", term]).await {
            Ok(countries) => {
                if let Some(origin) = us_origin(&countries) {
                    lookup.country = Some("US".to_string());
                    lookup.origin = origin;
                }
            }
            Err(e) => log::warn!("[iucn] country lookup failed for {term}: {e}"),
        }

        match self.get(&["species", "narrative", term]).await {
            Ok(narrative) => lookup.comment = parse_narrative(&narrative),
            Err(e) => log::warn!("[iucn] narrative lookup failed for {term}: {e}"),
        }

        Ok(lookup)
    }
}

fn parse_species(term: &str, body: &serde_json::Value) -> Option<TaxonLookup> {
    let first = body["result"].as_array()?.first()?;
    let mut lookup = TaxonLookup::found(ProviderKind::Iucn, term);
    lookup.accepted_name = first["scientific_name"].as_str().map(String::from);
    lookup.id = match &first["taxonid"] {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    };
    Some(lookup)
}

/// Returns `Some(origin)` if the species occurs in the US.
fn us_origin(body: &serde_json::Value) -> Option<Option<String>> {
    body["result"]
        .as_array()?
        .iter()
        .find(|c| c["code"].as_str() == Some("US"))
        .map(|c| c["origin"].as_str().map(String::from))
}

fn parse_narrative(body: &serde_json::Value) -> Option<String> {
    body["result"]
        .as_array()?
        .first()?
        .get("taxonomicnotes")?
        .as_str()
        .and_then(strip_html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_species_result() {
        let body = serde_json::json!({
            "name": "Gopherus agassizii",
            "result": [{ "taxonid": 97246272, "scientific_name": "Gopherus agassizii" }]
        });
        let lookup = parse_species("Gopherus agassizii", &body).unwrap();
        assert_eq!(lookup.id.as_deref(), Some("97246272"));
        assert_eq!(lookup.accepted_name.as_deref(), Some("Gopherus agassizii"));
    }

    #[test]
    fn empty_species_result_is_not_found() {
        let body = serde_json::json!({ "name": "Nope", "result": [] });
        assert!(parse_species("Nope", &body).is_none());
    }

    #[test]
    fn finds_us_origin() {
        let body = serde_json::json!({ "result": [
            { "code": "MX", "origin": "Native" },
            { "code": "US", "origin": "Introduced" }
        ]});
        assert_eq!(us_origin(&body), Some(Some("Introduced".to_string())));

        let body = serde_json::json!({ "result": [{ "code": "MX", "origin": "Native" }] });
        assert_eq!(us_origin(&body), None);
    }

    #[test]
    fn narrative_notes_are_stripped() {
        let body = serde_json::json!({ "result": [{ "taxonomicnotes": "<p>Split from <em>G. morafkai</em></p>" }] });
        assert_eq!(
            parse_narrative(&body).as_deref(),
            Some("Split from G. morafkai")
        );
        let body = serde_json::json!({ "result": [{ "taxonomicnotes": null }] });
        assert!(parse_narrative(&body).is_none());
    }
}
