//! GBIF species API client.
//!
//! Names are resolved against the GBIF backbone with `species/match`. The
//! origin is read from the first `species/search` result that reports one.
//! [`match_backbone`] is also used by the occurrence tooling to turn a
//! scientific name into a taxon key.
//!
//! See <https://techdocs.gbif.org/en/openapi/v1/species>

use async_trait::async_trait;

use crate::retry::RetryPolicy;
use crate::{HttpContext, ProviderKind, TaxonLookup, TaxonomyError, TaxonomyProvider, retry};

/// A backbone match for one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackboneMatch {
    /// Backbone usage key.
    pub usage_key: u64,
    /// Matched scientific name including authorship.
    pub scientific_name: Option<String>,
    /// Taxonomic status (`ACCEPTED`, `SYNONYM`, ...).
    pub status: Option<String>,
    /// How the name matched (`EXACT`, `FUZZY`, `HIGHERRANK`).
    pub match_type: Option<String>,
    /// Accepted usage key when the match is a synonym.
    pub accepted_usage_key: Option<u64>,
}

/// Matches `name` against the GBIF backbone at species rank.
///
/// Returns `Ok(None)` when GBIF reports no match or only a higher-rank
/// match.
///
/// # Errors
///
/// Returns [`TaxonomyError`] if the request fails or the body is not JSON.
pub async fn match_backbone(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    base_url: &str,
    name: &str,
) -> Result<Option<BackboneMatch>, TaxonomyError> {
    let url = format!("{}/species/match", base_url.trim_end_matches('/'));
    let body = retry::send_json(policy, || {
        client
            .get(&url)
            .query(&[("name", name), ("rank", "SPECIES"), ("strict", "false")])
    })
    .await?;
    Ok(parse_match(&body))
}

fn parse_match(body: &serde_json::Value) -> Option<BackboneMatch> {
    let match_type = body["matchType"].as_str();
    if matches!(match_type, None | Some("NONE" | "HIGHERRANK")) {
        return None;
    }
    Some(BackboneMatch {
        usage_key: body["usageKey"].as_u64()?,
        scientific_name: body["scientificName"].as_str().map(String::from),
        status: body["status"].as_str().map(String::from),
        match_type: match_type.map(String::from),
        accepted_usage_key: body["acceptedUsageKey"].as_u64(),
    })
}

/// GBIF backbone taxonomy provider.
pub struct GbifProvider {
    http: HttpContext,
    base_url: String,
}

impl GbifProvider {
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
impl TaxonomyProvider for GbifProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gbif
    }

    async fn lookup(&self, term: &str) -> Result<TaxonLookup, TaxonomyError> {
        let Some(matched) =
            match_backbone(&self.http.client, &self.http.policy, &self.base_url, term).await?
        else {
            return Ok(TaxonLookup::not_found(ProviderKind::Gbif, term));
        };

        let search_url = format!("{}/species/search", self.base_url);
        let search = retry::send_json(&self.http.policy, || {
            self.http
                .client
                .get(&search_url)
                .query(&[("q", term), ("rank", "SPECIES")])
        })
        .await;

        let (origin, vernacular) = match search {
            Ok(body) => parse_search(&body),
            Err(e) => {
                log::warn!("[gbif] species search failed for {term}: {e}");
                (None, None)
            }
        };

        let mut lookup = TaxonLookup::found(ProviderKind::Gbif, term);
        lookup.id = Some(matched.usage_key.to_string());
        lookup.accepted_name.clone_from(&matched.scientific_name);
        lookup.origin = origin;
        lookup.comment = match_comment(&matched, vernacular.as_deref());
        Ok(lookup)
    }
}

/// Returns the first reported origin and vernacular name in search results.
fn parse_search(body: &serde_json::Value) -> (Option<String>, Option<String>) {
    let Some(results) = body["results"].as_array() else {
        return (None, None);
    };
    let origin = results
        .iter()
        .find_map(|r| r["origin"].as_str().map(String::from));
    let vernacular = results.iter().find_map(|r| {
        r["vernacularNames"]
            .as_array()?
            .first()?
            .get("vernacularName")?
            .as_str()
            .map(String::from)
    });
    (origin, vernacular)
}

fn match_comment(matched: &BackboneMatch, vernacular: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(status) = &matched.status {
        parts.push(format!("status: {status}"));
    }
    if let Some(accepted) = matched.accepted_usage_key {
        parts.push(format!("accepted usage key: {accepted}"));
    }
    if let Some(match_type) = &matched.match_type {
        parts.push(format!("match: {match_type}"));
    }
    if let Some(name) = vernacular {
        parts.push(format!("vernacular: {name}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}
