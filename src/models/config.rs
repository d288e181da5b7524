// src/models/config.rs

//! Application configuration structures.
//!
//! The configuration is a tree of entities, each owning a set of technologies
//! (one API integration scope), each owning a set of sources (one logical
//! endpoint to poll). Maps are `BTreeMap`s keyed by name so iteration order
//! is deterministic everywhere downstream.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::HttpMethod;
use crate::utils::placeholders;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Configuration schema version
    #[serde(default)]
    pub version: String,

    /// HTTP client behavior settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Entity definitions, keyed by entity name
    #[serde(default)]
    pub entities: BTreeMap<String, EntityConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for structural sanity.
    ///
    /// Scope-level checks (extract-path shape, scheduling intervals) live in
    /// the classifier; this covers everything knowable from one source or
    /// technology in isolation.
    pub fn validate(&self) -> Result<()> {
        if self.collector.user_agent.trim().is_empty() {
            return Err(AppError::validation("collector.user_agent is empty"));
        }
        if self.collector.timeout_secs == 0 {
            return Err(AppError::validation("collector.timeout_secs must be > 0"));
        }

        for (entity_name, entity) in &self.entities {
            for (tech_name, tech) in &entity.technologies {
                if !tech.enabled {
                    continue;
                }
                tech.validate()
                    .map_err(|e| AppError::validation(format!("{entity_name}.{tech_name}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Total number of enabled sources across all enabled scopes.
    pub fn enabled_source_count(&self) -> usize {
        self.entities
            .values()
            .flat_map(|e| e.technologies.values())
            .filter(|t| t.enabled)
            .flat_map(|t| t.sources.values())
            .filter(|s| s.enabled)
            .count()
    }
}

/// HTTP client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Directory for emitted records, relative to the config file
    #[serde(default = "defaults::output_dir")]
    pub output_dir: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            output_dir: defaults::output_dir(),
        }
    }
}

/// Top-level owner grouping one or more technologies.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntityConfig {
    /// Human-readable entity name
    #[serde(default)]
    pub name: String,

    /// Technology scopes, keyed by technology name
    #[serde(default)]
    pub technologies: BTreeMap<String, TechnologyConfig>,
}

/// One API integration scope: base URL, auth, pagination rules, sources.
///
/// Technologies are the scope boundary for dependency resolution; source
/// dependencies never cross technology scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL every source endpoint is appended to
    pub base_url: String,

    /// Bearer token, required when authentication is "bearer"
    #[serde(default)]
    pub api_token: Option<String>,

    /// Token expiry timestamp (RFC 3339 string), informational only
    #[serde(default)]
    pub token_expires: Option<DateTime<Utc>>,

    /// Authentication mode: "bearer" or "none"
    #[serde(default)]
    pub authentication: String,

    /// Pagination descriptor; absence means pagination is unsupported
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,

    /// Sources, keyed by source name (unique within the technology)
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl TechnologyConfig {
    fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| AppError::validation(format!("invalid base_url '{}': {e}", self.base_url)))?;

        match self.authentication.to_ascii_lowercase().as_str() {
            "" | "none" => {}
            "bearer" => {
                if self.api_token.as_deref().unwrap_or("").is_empty() {
                    return Err(AppError::validation(
                        "authentication is 'bearer' but api_token is missing",
                    ));
                }
            }
            other => {
                return Err(AppError::validation(format!(
                    "unknown authentication mode '{other}'"
                )));
            }
        }

        for (name, source) in self.sources.iter().filter(|(_, s)| s.enabled) {
            source
                .validate(name, &self.sources)
                .map_err(|e| AppError::validation(format!("source '{name}': {e}")))?;
        }
        Ok(())
    }

    /// Whether the technology injects a bearer token into request headers.
    pub fn uses_bearer(&self) -> bool {
        self.authentication.eq_ignore_ascii_case("bearer")
    }
}

/// Pagination descriptor for a technology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Response key holding the URL of the next page
    pub next_link_key: String,

    /// Response key holding the page's items array
    pub items_key: String,
}

/// One logical endpoint to poll, with its own schedule or dependency linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Polling interval in seconds; required for independently scheduled sources
    #[serde(default)]
    pub interval: Option<u64>,

    /// Endpoint template, may contain `{param}` placeholder tokens
    pub endpoint: String,

    /// HTTP method, case-insensitive
    #[serde(default = "defaults::method")]
    pub method: String,

    /// Static request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Static query parameters; values may be relative-time expressions
    #[serde(default)]
    pub query: BTreeMap<String, QueryValue>,

    /// JSON body for POST/PUT requests
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Names of sources in the same technology that must run first
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Placeholder token -> dotted path into a dependency's stored result
    #[serde(default)]
    pub extract_from: BTreeMap<String, String>,
}

impl SourceConfig {
    fn validate(&self, name: &str, siblings: &BTreeMap<String, SourceConfig>) -> Result<()> {
        HttpMethod::parse(&self.method)?;

        for dep in &self.dependencies {
            if dep == name {
                return Err(AppError::validation("source depends on itself"));
            }
            match siblings.get(dep) {
                None => {
                    return Err(AppError::validation(format!(
                        "dependency '{dep}' does not exist in this technology"
                    )));
                }
                Some(s) if !s.enabled => {
                    return Err(AppError::validation(format!(
                        "dependency '{dep}' is disabled"
                    )));
                }
                Some(_) => {}
            }
        }

        if !self.extract_from.is_empty() && self.dependencies.is_empty() {
            return Err(AppError::validation(
                "extract_from requires at least one dependency",
            ));
        }

        // Placeholders and extract_from keys must agree exactly: a binding
        // without a placeholder is dead, a placeholder without a binding can
        // never be substituted.
        let tokens = placeholders(&self.endpoint);
        for param in self.extract_from.keys() {
            if !tokens.contains(param) {
                return Err(AppError::validation(format!(
                    "extract_from key '{param}' has no {{{param}}} placeholder in endpoint"
                )));
            }
        }
        for token in &tokens {
            if !self.extract_from.contains_key(token) {
                return Err(AppError::validation(format!(
                    "endpoint placeholder {{{token}}} has no extract_from entry"
                )));
            }
        }
        Ok(())
    }
}

/// A static query parameter value.
///
/// Either a literal scalar, or a relative-time expression table resolved
/// against the current time at job-registration time, e.g.
/// `since = { value = "3 days ago", type = "ISO8601" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Relative {
        value: String,
        #[serde(rename = "type")]
        format: String,
    },
    Literal(serde_json::Value),
}

mod defaults {
    pub fn user_agent() -> String {
        "siphon/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn output_dir() -> String {
        "entities".into()
    }
    pub fn method() -> String {
        "GET".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        version = "1"

        [collector]
        timeout_secs = 10

        [entities.acme]
        name = "Acme Corp"

        [entities.acme.technologies.cloudapp]
        enabled = true
        base_url = "https://api.cloudapp.example"
        api_token = "secret"
        token_expires = "2027-01-01T00:00:00Z"
        authentication = "bearer"
        pagination = { next_link_key = "nextLink", items_key = "items" }

        [entities.acme.technologies.cloudapp.sources.alerts]
        enabled = true
        interval = 300
        endpoint = "/v1/alerts"
        method = "GET"

        [entities.acme.technologies.cloudapp.sources.alerts.query]
        limit = 100
        since = { value = "3 days ago", type = "ISO8601" }

        [entities.acme.technologies.cloudapp.sources.alert_detail]
        enabled = true
        endpoint = "/v1/alerts/{id}"
        dependencies = ["alerts"]
        extract_from = { id = "alerts.items.id" }
    "#;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.collector.timeout_secs, 10);

        let tech = &config.entities["acme"].technologies["cloudapp"];
        assert!(tech.enabled);
        assert!(tech.uses_bearer());
        assert_eq!(tech.pagination.as_ref().unwrap().items_key, "items");

        let alerts = &tech.sources["alerts"];
        assert_eq!(alerts.interval, Some(300));
        assert!(matches!(
            alerts.query["since"],
            QueryValue::Relative { .. }
        ));
        assert!(matches!(alerts.query["limit"], QueryValue::Literal(_)));

        let detail = &tech.sources["alert_detail"];
        assert_eq!(detail.dependencies, vec!["alerts"]);
        assert_eq!(detail.extract_from["id"], "alerts.items.id");

        config.validate().unwrap();
        assert_eq!(config.enabled_source_count(), 2);
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        let tech = config
            .entities
            .get_mut("acme")
            .unwrap()
            .technologies
            .get_mut("cloudapp")
            .unwrap();
        tech.sources
            .get_mut("alert_detail")
            .unwrap()
            .dependencies = vec!["ghost".into()];

        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_unbound_placeholder() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        let tech = config
            .entities
            .get_mut("acme")
            .unwrap()
            .technologies
            .get_mut("cloudapp")
            .unwrap();
        tech.sources.get_mut("alerts").unwrap().endpoint = "/v1/alerts/{region}".into();

        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bearer_without_token() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config
            .entities
            .get_mut("acme")
            .unwrap()
            .technologies
            .get_mut("cloudapp")
            .unwrap()
            .api_token = None;

        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_disabled_technology_is_not_validated() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        let tech = config
            .entities
            .get_mut("acme")
            .unwrap()
            .technologies
            .get_mut("cloudapp")
            .unwrap();
        tech.enabled = false;
        tech.base_url = "not a url".into();

        config.validate().unwrap();
        assert_eq!(config.enabled_source_count(), 0);
    }
}
