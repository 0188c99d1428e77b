#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Taxonomy lookup result types.
//!
//! Every taxonomy provider (NatureServe, IUCN, ITIS, GBIF, Global Names
//! Resolver) reports its answer as a [`TaxonLookup`]. A lookup that finds
//! nothing is a normal [`LookupStatus::NotFound`] result, and a lookup that
//! could not be completed (timeout, HTTP error, unparseable body) is a
//! [`LookupStatus::Failed`] result carrying the reason. Neither aborts a
//! batch.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which taxonomy service produced a lookup result.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    /// `NatureServe` global species service.
    NatureServe,
    /// IUCN Red List API.
    Iucn,
    /// Integrated Taxonomic Information System.
    Itis,
    /// GBIF backbone taxonomy.
    Gbif,
    /// Global Names Resolver.
    GlobalNames,
}

/// Outcome of a single lookup.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStatus {
    /// The provider returned a matching taxon concept.
    Found,
    /// The provider answered but had no (or no unambiguous) match.
    NotFound,
    /// The request or response handling failed.
    Failed,
}

/// Uniform result of searching one provider for one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonLookup {
    /// Provider that was searched.
    pub provider: ProviderKind,
    /// Scientific or common name that was searched.
    pub search_term: String,
    /// Lookup outcome.
    pub status: LookupStatus,
    /// Provider-specific taxon identifier (TSN, GUID, taxon key, ...).
    pub id: Option<String>,
    /// Name the provider accepts for this concept.
    pub accepted_name: Option<String>,
    /// Free-text taxonomic comments with markup removed.
    pub comment: Option<String>,
    /// Country code when the provider reports the taxon in the US.
    pub country: Option<String>,
    /// Origin status in that country (e.g. "Native", "Introduced").
    pub origin: Option<String>,
    /// Failure reason when `status` is [`LookupStatus::Failed`].
    pub failure: Option<String>,
}

impl TaxonLookup {
    /// Creates an empty `Found` result to be filled in by a provider.
    #[must_use]
    pub fn found(provider: ProviderKind, search_term: &str) -> Self {
        Self {
            provider,
            search_term: search_term.to_string(),
            status: LookupStatus::Found,
            id: None,
            accepted_name: None,
            comment: None,
            country: None,
            origin: None,
            failure: None,
        }
    }

    /// Creates a `NotFound` result.
    #[must_use]
    pub fn not_found(provider: ProviderKind, search_term: &str) -> Self {
        Self {
            status: LookupStatus::NotFound,
            ..Self::found(provider, search_term)
        }
    }

    /// Creates a `Failed` result carrying the failure reason.
    #[must_use]
    pub fn failed(provider: ProviderKind, search_term: &str, reason: impl Into<String>) -> Self {
        Self {
            status: LookupStatus::Failed,
            failure: Some(reason.into()),
            ..Self::found(provider, search_term)
        }
    }

    /// Returns `true` if the provider returned a match.
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.status == LookupStatus::Found
    }
}
