//! ITIS client.
//!
//! Scientific names are searched through the ITIS Solr service on the
//! `nameWInd` field (name with rank indicators). When Solr has no match the
//! term is retried as a common name through `ITISService/searchByCommonName`,
//! which only reports TSNs, so those results carry no comment, country or
//! origin.

use async_trait::async_trait;

use crate::markup::{element_texts, parse_xml, strip_html};
use crate::{HttpContext, ProviderKind, TaxonLookup, TaxonomyError, TaxonomyProvider, retry};

/// Jurisdiction label used by ITIS for the lower 48 states.
const CONTINENTAL_US: &str = "Continental US";

/// ITIS provider.
pub struct ItisProvider {
    http: HttpContext,
    solr_url: String,
    web_service_url: String,
}

impl ItisProvider {
    /// Creates a provider using the Solr and web service roots.
    #[must_use]
    pub fn new(http: HttpContext, solr_url: &str, web_service_url: &str) -> Self {
        Self {
            http,
            solr_url: solr_url.to_string(),
            web_service_url: web_service_url.trim_end_matches('/').to_string(),
        }
    }

    async fn search_common_name(&self, term: &str) -> Result<TaxonLookup, TaxonomyError> {
        let url = format!("{}/searchByCommonName", self.web_service_url);
        let xml = retry::send_text(&self.http.policy, || {
            self.http.client.get(&url).query(&[("srchKey", term)])
        })
        .await?;
        parse_common_name(term, &xml)
    }
}

#[async_trait]
impl TaxonomyProvider for ItisProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Itis
    }

    async fn lookup(&self, term: &str) -> Result<TaxonLookup, TaxonomyError> {
        let query = format!("nameWInd:{}", solr_escape(term));
        let body = retry::send_json(&self.http.policy, || {
            self.http
                .client
                .get(&self.solr_url)
                .query(&[("q", query.as_str()), ("rows", "10"), ("wt", "json")])
        })
        .await?;

        if let Some(lookup) = parse_solr(term, &body)? {
            return Ok(lookup);
        }

        log::debug!("[itis] no scientific name match for {term}, trying common name");
        self.search_common_name(term).await
    }
}

/// Escapes Solr query syntax characters (including spaces) in a term.
fn solr_escape(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 8);
    for c in term.chars() {
        if c.is_whitespace() || "+-&|!(){}[]^\"~*?:\\/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Parses a Solr response. Returns `Ok(None)` when nothing matched.
fn parse_solr(term: &str, body: &serde_json::Value) -> Result<Option<TaxonLookup>, TaxonomyError> {
    let response = body.get("response").ok_or_else(|| TaxonomyError::Parse {
        message: "ITIS Solr response has no 'response' object".to_string(),
    })?;

    if response["numFound"].as_u64().unwrap_or(0) == 0 {
        return Ok(None);
    }
    let Some(doc) = response["docs"].as_array().and_then(|d| d.first()) else {
        return Ok(None);
    };

    let mut lookup = TaxonLookup::found(ProviderKind::Itis, term);
    lookup.id = match &doc["tsn"] {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    lookup.accepted_name = doc["nameWInd"].as_str().map(String::from);
    lookup.comment = publications(&doc["publication"]);

    if let Some(origin) = string_values(&doc["jurisdiction"])
        .iter()
        .find_map(|j| continental_us_origin(j))
    {
        lookup.country = Some("US".to_string());
        lookup.origin = Some(origin);
    }

    Ok(Some(lookup))
}

fn string_values(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// Joins `$`-delimited publication references into one readable comment.
fn publications(value: &serde_json::Value) -> Option<String> {
    let refs: Vec<String> = string_values(value)
        .iter()
        .filter_map(|p| {
            let fields: Vec<&str> = p
                .split('$')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect();
            strip_html(&fields.join(", "))
        })
        .collect();
    if refs.is_empty() {
        None
    } else {
        Some(refs.join("; "))
    }
}

/// Extracts the origin from a jurisdiction string such as
/// `"$Continental US$native$"`.
fn continental_us_origin(jurisdiction: &str) -> Option<String> {
    let mut parts = jurisdiction.split('$').filter(|p| !p.is_empty());
    parts.find(|p| *p == CONTINENTAL_US)?;
    parts.next().map(String::from)
}

/// Parses a `searchByCommonName` XML response.
fn parse_common_name(term: &str, xml: &str) -> Result<TaxonLookup, TaxonomyError> {
    let doc = parse_xml(xml)?;
    let root = doc.root();

    let tsns: Vec<String> = element_texts(root, "tsn")
        .into_iter()
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
        .collect();
    let Some(first) = tsns.first() else {
        return Ok(TaxonLookup::not_found(ProviderKind::Itis, term));
    };

    let wanted = term.to_lowercase();
    let mut lookup = TaxonLookup::found(ProviderKind::Itis, term);
    lookup.id = Some(first.clone());
    lookup.accepted_name = element_texts(root, "commonName")
        .into_iter()
        .find(|n| n.to_lowercase() == wanted);
    if tsns.len() > 1 {
        lookup.comment = Some(format!("common name matched TSNs {}", tsns.join(", ")));
    }
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_spaces_for_solr() {
        assert_eq!(solr_escape("Centronyx henslowii"), r"Centronyx\ henslowii");
        assert_eq!(
            solr_escape("Terrapene carolina carolina"),
            r"Terrapene\ carolina\ carolina"
        );
    }

    #[test]
    fn parses_solr_document() {
        let body = serde_json::json!({
            "response": {
                "numFound": 1,
                "docs": [{
                    "tsn": "1082360",
                    "nameWInd": "Centronyx henslowii",
                    "publication": ["$Chesser, R. T.$2019$Sixtieth Supplement$"],
                    "jurisdiction": ["$Canada$native$", "$Continental US$native$"]
                }]
            }
        });
        let lookup = parse_solr("Centronyx henslowii", &body).unwrap().unwrap();
        assert_eq!(lookup.id.as_deref(), Some("1082360"));
        assert_eq!(lookup.accepted_name.as_deref(), Some("Centronyx henslowii"));
        assert_eq!(
            lookup.comment.as_deref(),
            Some("Chesser, R. T., 2019, Sixtieth Supplement")
        );
        assert_eq!(lookup.country.as_deref(), Some("US"));
        assert_eq!(lookup.origin.as_deref(), Some("native"));
    }

    #[test]
    fn zero_hits_is_none() {
        let body = serde_json::json!({ "response": { "numFound": 0, "docs": [] } });
        assert!(parse_solr("x", &body).unwrap().is_none());
        assert!(parse_solr("x", &serde_json::json!({})).is_err());
    }

    #[test]
    fn parses_common_name_service() {
        let xml = r#"<ns:searchByCommonNameResponse xmlns:ns="http://itis_service.itis.usgs.gov" xmlns:ax21="http://data.itis_service.itis.usgs.gov/xsd">
            <ns:return><ax21:commonNames>
                <ax21:commonName>Snowy Plover</ax21:commonName>
                <ax21:language>English</ax21:language>
                <ax21:tsn>824563</ax21:tsn>
            </ax21:commonNames></ns:return>
        </ns:searchByCommonNameResponse>"#;
        let lookup = parse_common_name("snowy plover", xml).unwrap();
        assert!(lookup.is_found());
        assert_eq!(lookup.id.as_deref(), Some("824563"));
        assert_eq!(lookup.accepted_name.as_deref(), Some("Snowy Plover"));
        assert!(lookup.country.is_none());

        let empty = parse_common_name(
            "zzz",
            r#"<ns:searchByCommonNameResponse xmlns:ns="http://itis_service.itis.usgs.gov"><ns:return/></ns:searchByCommonNameResponse>"#,
        )
        .unwrap();
        assert!(!empty.is_found());
        assert!(parse_common_name("zzz", "<ns:return/>").is_err());
    }
}
