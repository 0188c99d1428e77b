#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Taxonomy concept lookups.
//!
//! Reconciles species naming concepts across five services configured via
//! TOML files in `services/`:
//!
//! 1. **`NatureServe`** (priority 1): XML web services, access key required.
//! 2. **IUCN Red List** (priority 2): JSON API, token required.
//! 3. **ITIS** (priority 3): Solr JSON search with a common name fallback.
//! 4. **GBIF** (priority 4): backbone taxonomy match.
//! 5. **Global Names Resolver** (priority 5): cross-database resolution.
//!
//! Every provider implements [`TaxonomyProvider`] and answers with the
//! uniform [`TaxonLookup`]. Provider clients report failures as `Err`;
//! [`batch::lookup_species`] turns those into `Failed` rows so one bad
//! response never stops a batch.

pub mod batch;
pub mod gbif;
pub mod global_names;
pub mod iucn;
pub mod itis;
pub mod markup;
pub mod natureserve;
pub mod retry;
pub mod service_registry;

use async_trait::async_trait;
pub use hab_eval_taxonomy_models::{LookupStatus, ProviderKind, TaxonLookup};
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::service_registry::{ProviderConfig, TaxonomyService};

/// Errors from taxonomy lookups.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Requested URL.
        url: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// A credential environment variable is not set.
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential {
        /// Name of the environment variable.
        var: String,
    },

    /// A configured URL is malformed.
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it could not be used.
        message: String,
    },

    /// Writing the results table failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A requested service ID is not in the registry.
    #[error("Unknown taxonomy service {id:?} (valid: {valid})")]
    UnknownService {
        /// The requested ID.
        id: String,
        /// Comma-separated list of registered IDs.
        valid: String,
    },
}

/// A taxonomy service that can be searched by scientific or common name.
#[async_trait]
pub trait TaxonomyProvider: Send + Sync {
    /// Which service this provider queries.
    fn kind(&self) -> ProviderKind;

    /// Searches the service for `term`.
    ///
    /// A search with no match is `Ok` with [`LookupStatus::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError`] if the request fails or the response
    /// cannot be interpreted.
    async fn lookup(&self, term: &str) -> Result<TaxonLookup, TaxonomyError>;
}

/// Shared HTTP state handed to every provider.
#[derive(Debug, Clone)]
pub struct HttpContext {
    /// Client configured with the per-request timeout.
    pub client: reqwest::Client,
    /// Retry behaviour for every request.
    pub policy: RetryPolicy,
}

/// Builds a provider for a configured service.
///
/// Credentials are read from the environment variables named in the
/// service configuration.
///
/// # Errors
///
/// Returns [`TaxonomyError::MissingCredential`] if a required credential
/// variable is not set.
pub fn build_provider(
    service: &TaxonomyService,
    http: &HttpContext,
) -> Result<Box<dyn TaxonomyProvider>, TaxonomyError> {
    Ok(match &service.provider {
        ProviderConfig::NatureServe { base_url, key_env } => Box::new(
            natureserve::NatureServeProvider::new(http.clone(), base_url, &credential(key_env)?),
        ),
        ProviderConfig::Iucn {
            base_url,
            token_env,
        } => Box::new(iucn::IucnProvider::new(
            http.clone(),
            base_url,
            &credential(token_env)?,
        )),
        ProviderConfig::Itis {
            solr_url,
            web_service_url,
        } => Box::new(itis::ItisProvider::new(
            http.clone(),
            solr_url,
            web_service_url,
        )),
        ProviderConfig::Gbif { base_url } => {
            Box::new(gbif::GbifProvider::new(http.clone(), base_url))
        }
        ProviderConfig::GlobalNames { base_url } => Box::new(
            global_names::GlobalNamesProvider::new(http.clone(), base_url),
        ),
    })
}

/// Builds providers for every enabled service, skipping (with a warning)
/// services whose credentials are not available.
#[must_use]
pub fn build_enabled_providers(http: &HttpContext) -> Vec<Box<dyn TaxonomyProvider>> {
    service_registry::enabled_services()
        .iter()
        .filter_map(|service| match build_provider(service, http) {
            Ok(provider) => Some(provider),
            Err(e) => {
                log::warn!("Skipping taxonomy service {}: {e}", service.name);
                None
            }
        })
        .collect()
}

fn credential(var: &str) -> Result<String, TaxonomyError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TaxonomyError::MissingCredential {
            var: var.to_string(),
        })
}

/// Joins `segments` onto `base` as percent-encoded path segments.
///
/// # Errors
///
/// Returns [`TaxonomyError::InvalidUrl`] if `base` is not an absolute URL
/// that can carry path segments.
pub fn join_path(base: &str, segments: &[&str]) -> Result<reqwest::Url, TaxonomyError> {
    let invalid = |message: &str| TaxonomyError::InvalidUrl {
        url: base.to_string(),
        message: message.to_string(),
    };
    let mut url = reqwest::Url::parse(base).map_err(|e| invalid(&e.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| invalid("URL cannot be a base"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}
