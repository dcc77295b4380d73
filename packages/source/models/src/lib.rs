#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Site configuration types and the enums shared by the extraction
//! orchestrator.
//!
//! A [`SiteConfig`] describes a site that has already been discovered: where
//! its data lives, which [`ExtractionStrategy`] reads it, and how raw field
//! names map onto output columns. Configs are persisted as TOML by the
//! source crate's config store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// How a configured site's data is extracted.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Direct GET of a JSON (or CSV) endpoint.
    #[default]
    ApiJson,
    /// Best or selected `<table>` from the rendered page.
    DomTable,
    /// Data embedded in page JavaScript.
    JsObject,
    /// Endpoint first, rendered page on failure.
    Hybrid,
}

/// Kind of data source a [`DataSource`] points at.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSourceKind {
    #[default]
    Api,
    #[serde(alias = "dom_table")]
    Table,
    JsObject,
}

/// Where a site's data lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "type", default)]
    pub kind: DataSourceKind,
    /// Endpoint URL for API sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// CSS selector for table sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Dot path into the JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    /// Global variable name for embedded JS sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_owned()
}

impl DataSource {
    /// An API source reading `endpoint` with GET.
    #[must_use]
    pub fn api(endpoint: &str) -> Self {
        Self {
            kind: DataSourceKind::Api,
            endpoint: Some(endpoint.to_owned()),
            method: default_method(),
            ..Self::default()
        }
    }

    /// A table source matching `selector`.
    #[must_use]
    pub fn table(selector: &str) -> Self {
        Self {
            kind: DataSourceKind::Table,
            selector: Some(selector.to_owned()),
            method: default_method(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_data_path(mut self, path: &str) -> Self {
        self.data_path = Some(path.to_owned());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// Cached robots.txt verdict for a site.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum PolicyStatus {
    Allowed,
    Disallowed,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsPolicy {
    #[serde(default)]
    pub status: PolicyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub override_approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_extraction: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

fn default_created_by() -> String {
    "manual".to_owned()
}

impl Default for SiteMetadata {
    fn default() -> Self {
        Self {
            created: None,
            created_by: default_created_by(),
            last_successful_extraction: None,
            last_modified: None,
        }
    }
}

/// A known, previously discovered site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    pub page_url: String,
    #[serde(default)]
    pub extraction_strategy: ExtractionStrategy,
    /// Minimum seconds between requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
    #[serde(default)]
    pub data_source: DataSource,
    /// Output column -> raw field (or dotted path).
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub robots_policy: RobotsPolicy,
    #[serde(default)]
    pub metadata: SiteMetadata,
}

impl SiteConfig {
    /// Creates a config with default policy and metadata.
    #[must_use]
    pub fn new(
        id: &str,
        base_url: &str,
        page_url: &str,
        extraction_strategy: ExtractionStrategy,
        data_source: DataSource,
    ) -> Self {
        Self {
            id: id.to_owned(),
            name: id.to_owned(),
            base_url: base_url.to_owned(),
            page_url: page_url.to_owned(),
            extraction_strategy,
            rate_limit: None,
            data_source,
            field_mappings: BTreeMap::new(),
            robots_policy: RobotsPolicy::default(),
            metadata: SiteMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        name.clone_into(&mut self.name);
        self
    }

    #[must_use]
    pub fn with_field_mappings(mut self, mappings: BTreeMap<String, String>) -> Self {
        self.field_mappings = mappings;
        self
    }

    #[must_use]
    pub const fn with_rate_limit(mut self, seconds: f64) -> Self {
        self.rate_limit = Some(seconds);
        self
    }

    /// Short listing form.
    #[must_use]
    pub fn summary(&self) -> SiteSummary {
        SiteSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            page_url: self.page_url.clone(),
            extraction_strategy: self.extraction_strategy,
        }
    }
}

/// Listing row returned by `list_sites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub page_url: String,
    pub extraction_strategy: ExtractionStrategy,
}

/// Stable classification of a failed fetch, used to pick a backoff.
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
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    Network,
    Auth,
    RateLimit,
    BotDetection,
    Parsing,
    Unknown,
}

impl ErrorClass {
    /// Whether a fetch failing with this class is worth repeating.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Parsing)
    }
}

/// States of one scrape run.
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
pub enum ScrapeState {
    Discovering,
    Fetching,
    Parsing,
    Validating,
    Succeeded,
    Failed,
}

impl ScrapeState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn strategy_names_round_trip() {
        assert_eq!(ExtractionStrategy::DomTable.to_string(), "dom_table");
        assert_eq!(
            ExtractionStrategy::from_str("js_object").unwrap(),
            ExtractionStrategy::JsObject
        );
        assert!(ExtractionStrategy::from_str("scrape_everything").is_err());
    }

    #[test]
    fn site_config_reads_minimal_toml() {
        let site: SiteConfig = toml::from_str(
            r#"
            id = "example"
            base_url = "https://example.com"
            page_url = "https://example.com/charts"
            extraction_strategy = "api_json"

            [data_source]
            type = "api"
            endpoint = "https://example.com/api/series"
            "#,
        )
        .unwrap();

        assert_eq!(site.extraction_strategy, ExtractionStrategy::ApiJson);
        assert_eq!(site.data_source.method, "GET");
        assert_eq!(site.robots_policy.status, PolicyStatus::Unknown);
        assert_eq!(site.metadata.created_by, "manual");
        assert!(site.field_mappings.is_empty());
    }

    #[test]
    fn dom_table_alias_is_accepted() {
        let source: DataSource = toml::from_str("type = \"dom_table\"\nselector = \"#prices\"").unwrap();
        assert_eq!(source.kind, DataSourceKind::Table);
    }

    #[test]
    fn only_parsing_is_not_retryable() {
        assert!(!ErrorClass::Parsing.is_retryable());
        assert!(ErrorClass::RateLimit.is_retryable());
        assert!(ScrapeState::Failed.is_terminal());
        assert!(!ScrapeState::Parsing.is_terminal());
    }
}
