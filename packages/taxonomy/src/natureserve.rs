//! `NatureServe` global species web services client.
//!
//! Two requests per search:
//!
//! 1. `v1/globalSpecies/list/nameSearch` resolves a scientific or common
//!    name to a global species UID.
//! 2. `v1.1/globalSpecies/comprehensive` returns the full species report,
//!    from which the accepted name, taxonomic comments and US national
//!    origin are read.
//!
//! Both endpoints answer in XML.

use async_trait::async_trait;

use crate::markup::{element_texts, element_with_attr, first_element_text, parse_xml, strip_html};
use crate::{HttpContext, ProviderKind, TaxonLookup, TaxonomyError, TaxonomyProvider, retry};

/// `NatureServe` provider.
pub struct NatureServeProvider {
    http: HttpContext,
    base_url: String,
    access_key: String,
}

impl NatureServeProvider {
    /// Creates a provider rooted at `base_url` using `access_key`.
    #[must_use]
    pub fn new(http: HttpContext, base_url: &str, access_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
        }
    }
}

#[async_trait]
impl TaxonomyProvider for NatureServeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NatureServe
    }

    async fn lookup(&self, term: &str) -> Result<TaxonLookup, TaxonomyError> {
        let search_url = format!("{}/v1/globalSpecies/list/nameSearch", self.base_url);
        let search_xml = retry::send_text(&self.http.policy, || {
            self.http
                .client
                .get(&search_url)
                .query(&[("name", term), ("NSAccessKeyId", self.access_key.as_str())])
        })
        .await?;

        let Some(uid) = parse_search(&search_xml)? else {
            return Ok(TaxonLookup::not_found(ProviderKind::NatureServe, term));
        };

        let report_url = format!("{}/v1.1/globalSpecies/comprehensive", self.base_url);
        let report_xml = retry::send_text(&self.http.policy, || {
            self.http
                .client
                .get(&report_url)
                .query(&[("uid", uid.as_str()), ("NSAccessKeyId", self.access_key.as_str())])
        })
        .await?;

        parse_report(term, &uid, &report_xml)
    }
}

/// Returns the first global species UID in a name search response.
fn parse_search(xml: &str) -> Result<Option<String>, TaxonomyError> {
    let doc = parse_xml(xml)?;
    Ok(first_element_text(doc.root(), "globalSpeciesUid"))
}

/// Parses a comprehensive species report.
fn parse_report(term: &str, uid: &str, xml: &str) -> Result<TaxonLookup, TaxonomyError> {
    let doc = parse_xml(xml)?;
    let root = doc.root();

    let mut lookup = TaxonLookup::found(ProviderKind::NatureServe, term);
    lookup.id = Some(uid.to_string());
    lookup.accepted_name = first_element_text(root, "unformattedName");
    lookup.comment = first_element_text(root, "taxonomicComments").and_then(|c| strip_html(&c));

    if let Some(us) = element_with_attr(root, "nation", "nationCode", "US") {
        lookup.country = Some("US".to_string());
        // Multiple national distributions may be listed; the last one wins.
        lookup.origin = element_texts(us, "origin")
            .into_iter()
            .rfind(|o| !o.is_empty());
    }

    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<globalSpecies xmlns="http://services.natureserve.org/docs/schemas/biodiversityDataFlow/1" uid="ELEMENT_GLOBAL.2.102867">
  <classification>
    <names>
      <scientificName>
        <unformattedName>Centronyx henslowii</unformattedName>
      </scientificName>
    </names>
    <taxonomy>
      <formalTaxonomy>
        <taxonomicComments>&lt;p&gt;Formerly placed in &lt;i&gt;Ammodramus&lt;/i&gt;.&lt;/p&gt;</taxonomicComments>
      </formalTaxonomy>
    </taxonomy>
  </classification>
  <distribution>
    <nations>
      <nation nationCode="CA" nationName="Canada">
        <nationalDistributions>
          <nationalDistribution><origin>Native</origin></nationalDistribution>
        </nationalDistributions>
      </nation>
      <nation nationCode="US" nationName="United States">
        <nationalDistributions>
          <nationalDistribution><origin>Native</origin></nationalDistribution>
        </nationalDistributions>
      </nation>
    </nations>
  </distribution>
</globalSpecies>"#;

    #[test]
    fn parses_comprehensive_report() {
        let lookup =
            parse_report("Centronyx henslowii", "ELEMENT_GLOBAL.2.102867", REPORT).unwrap();
        assert!(lookup.is_found());
        assert_eq!(lookup.accepted_name.as_deref(), Some("Centronyx henslowii"));
        assert_eq!(
            lookup.comment.as_deref(),
            Some("Formerly placed in Ammodramus.")
        );
        assert_eq!(lookup.country.as_deref(), Some("US"));
        assert_eq!(lookup.origin.as_deref(), Some("Native"));
    }

    #[test]
    fn report_without_us_nation_has_no_country() {
        let xml = "<globalSpecies><unformattedName>Equus caballus</unformattedName></globalSpecies>";
        let lookup = parse_report("Equus caballus", "X", xml).unwrap();
        assert_eq!(lookup.accepted_name.as_deref(), Some("Equus caballus"));
        assert!(lookup.country.is_none());
        assert!(lookup.origin.is_none());
        assert!(lookup.comment.is_none());
    }

    #[test]
    fn cdata_comments_are_flattened() {
        let xml = "<globalSpecies>\
            <unformattedName>Gopherus morafkai</unformattedName>\
            <taxonomicComments><![CDATA[<p>Split from <i>G. agassizii</i> &#8212; 2011.</p>]]></taxonomicComments>\
            </globalSpecies>";
        let lookup = parse_report("Gopherus morafkai", "X", xml).unwrap();
        assert_eq!(
            lookup.comment.as_deref(),
            Some("Split from G. agassizii \u{2014} 2011.")
        );
    }

    #[test]
    fn search_takes_first_uid() {
        let xml = r#"<speciesSearchReport xmlns="http://services.natureserve.org/docs/schemas/biodiversityDataFlow/1">
            <speciesSearchResultList>
                <speciesSearchResult uid="ELEMENT_GLOBAL.2.102867">
                    <globalSpeciesUid>ELEMENT_GLOBAL.2.102867</globalSpeciesUid>
                </speciesSearchResult>
            </speciesSearchResultList>
        </speciesSearchReport>"#;
        assert_eq!(
            parse_search(xml).unwrap().as_deref(),
            Some("ELEMENT_GLOBAL.2.102867")
        );
        assert_eq!(parse_search("<speciesSearchReport/>").unwrap(), None);
        assert!(parse_search("<speciesSearchReport>").is_err());
    }
}
