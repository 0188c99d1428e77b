//! Compile-time registry of taxonomy service configurations.
//!
//! Each taxonomy provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`].

use serde::Deserialize;

use crate::TaxonomyError;

/// A taxonomy service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyService {
    /// Unique identifier (e.g., `"itis"`, `"gbif"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service takes part in batch lookups.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Execution order; lower values run first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// `NatureServe` XML web services.
    NatureServe {
        /// REST root (e.g., `"https://services.natureserve.org/idd/rest/ns"`).
        base_url: String,
        /// Environment variable holding the `NSAccessKeyId`.
        key_env: String,
    },
    /// IUCN Red List v3 API.
    Iucn {
        /// API root (e.g., `"https://apiv3.iucnredlist.org/api/v3"`).
        base_url: String,
        /// Environment variable holding the API token.
        token_env: String,
    },
    /// ITIS Solr search plus the SOAP-over-HTTP common name service.
    Itis {
        /// Solr endpoint.
        solr_url: String,
        /// `ITISService` root used for common name searches.
        web_service_url: String,
    },
    /// GBIF species API.
    Gbif {
        /// API root (e.g., `"https://api.gbif.org/v1"`).
        base_url: String,
    },
    /// Global Names Resolver.
    GlobalNames {
        /// Resolver root (e.g., `"https://resolver.globalnames.org"`).
        base_url: String,
    },
}

const fn default_true() -> bool {
    true
}

impl TaxonomyService {
    /// Returns the provider's primary base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::NatureServe { base_url, .. }
            | ProviderConfig::Iucn { base_url, .. }
            | ProviderConfig::Gbif { base_url }
            | ProviderConfig::GlobalNames { base_url } => base_url,
            ProviderConfig::Itis { solr_url, .. } => solr_url,
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("natureserve", include_str!("../services/natureserve.toml")),
    ("iucn", include_str!("../services/iucn.toml")),
    ("itis", include_str!("../services/itis.toml")),
    ("gbif", include_str!("../services/gbif.toml")),
    ("global_names", include_str!("../services/global_names.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 5;

/// Returns all taxonomy service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<TaxonomyService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse taxonomy service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<TaxonomyService> {
    let mut services: Vec<TaxonomyService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Returns the services named by `ids`, sorted by priority.
///
/// An explicitly requested service is returned even if it is disabled.
/// Repeated IDs are returned once.
///
/// # Errors
///
/// Returns [`TaxonomyError::UnknownService`] for the first ID that is not
/// registered.
pub fn select_services(ids: &[String]) -> Result<Vec<TaxonomyService>, TaxonomyError> {
    let all = all_services();
    let mut selected: Vec<TaxonomyService> = Vec::with_capacity(ids.len());

    for id in ids {
        let Some(service) = all.iter().find(|s| &s.id == id) else {
            let mut valid: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
            valid.sort_unstable();
            return Err(TaxonomyError::UnknownService {
                id: id.clone(),
                valid: valid.join(", "),
            });
        };
        if !selected.iter().any(|s| s.id == service.id) {
            selected.push(service.clone());
        }
    }

    selected.sort_by_key(|s| s.priority);
    Ok(selected)
}
