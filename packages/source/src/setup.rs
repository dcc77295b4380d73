//! Turning a discovered page into a stored [`SiteConfig`].
//!
//! The interactive wizard lives in the CLI; everything it needs to list
//! sources, suggest mappings and build a config is here so the
//! non-interactive path shares it.

use std::collections::BTreeMap;

use chrono::Utc;
use data_fetch_compliance::{RobotsChecker, RobotsStatus};
use data_fetch_discover::CandidateEndpoint;
use data_fetch_scraper::html_table::{self, TableInfo};
use data_fetch_source_models::{DataSource, PolicyStatus, RobotsPolicy};

use crate::archive::generate_site_id;
use crate::config_store::{self, ConfigStore};
use crate::universal::{Discovery, UniversalScraper};
use crate::{ExtractionStrategy, SiteConfig, SourceError};

/// Tables need more rows than this to be offered as a source.
pub const MIN_TABLE_ROWS: usize = 5;

/// `created_by` for configs written by setup.
pub const CREATED_BY: &str = "config_generator";

/// Target column and the source field names that suggest it, in priority
/// order.
pub const MAPPING_PATTERNS: &[(&str, &[&str])] = &[
    ("date", &["date", "time", "timestamp", "datetime", "created_at", "period"]),
    ("volume", &["volume", "vol", "trading_volume", "total_volume"]),
    ("price", &["price", "close", "closing_price", "value", "rate"]),
    ("open", &["open", "opening", "open_price"]),
    ("high", &["high", "highest", "high_price", "max"]),
    ("low", &["low", "lowest", "low_price", "min"]),
    ("market_cap", &["market_cap", "marketcap", "mcap", "market_capitalization"]),
];

/// A data source the user can pick during setup.
#[derive(Debug, Clone)]
pub enum SetupSource {
    Endpoint(CandidateEndpoint),
    Table(TableInfo),
}

impl SetupSource {
    /// One-line description for listings.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Endpoint(endpoint) => {
                let url: String = endpoint.url.chars().take(60).collect();
                let mut text = format!("API endpoint: {url}... ({})", endpoint.content_type);
                if let Some(structure) = &endpoint.detected_structure {
                    text.push_str(&format!(" - {structure}"));
                }
                text
            }
            Self::Table(table) => format!(
                "HTML table: {} ({} rows, {} cols)",
                table.selector, table.num_rows, table.num_cols
            ),
        }
    }

    #[must_use]
    pub fn field_names(&self) -> &[String] {
        match self {
            Self::Endpoint(endpoint) => &endpoint.field_names,
            Self::Table(table) => &table.headers,
        }
    }
}

/// Candidate endpoints first, then page tables with more than
/// [`MIN_TABLE_ROWS`] rows.
#[must_use]
pub fn list_sources(discovery: &Discovery) -> Vec<SetupSource> {
    let mut sources: Vec<SetupSource> = discovery
        .candidates
        .iter()
        .cloned()
        .map(SetupSource::Endpoint)
        .collect();

    if !discovery.page.html.is_empty() {
        match html_table::find_tables(&discovery.page.html) {
            Ok(tables) => sources.extend(
                tables
                    .into_iter()
                    .filter(|t| t.num_rows > MIN_TABLE_ROWS)
                    .map(SetupSource::Table),
            ),
            Err(e) => log::warn!("Could not list page tables: {e}"),
        }
    }
    sources
}

/// Maps well-known target columns onto matching source fields.
///
/// For each target the keywords are tried in order; a keyword matches a
/// field exactly (case-insensitive) before it matches as a substring.
#[must_use]
pub fn suggest_field_mappings(fields: &[String]) -> BTreeMap<String, String> {
    let lowered: Vec<(String, &String)> = fields
        .iter()
        .map(|f| (f.to_ascii_lowercase(), f))
        .collect();

    let mut mappings = BTreeMap::new();
    for (target, keywords) in MAPPING_PATTERNS {
        let found = keywords.iter().find_map(|kw| {
            lowered
                .iter()
                .find(|(lower, _)| lower == kw)
                .or_else(|| lowered.iter().find(|(lower, _)| lower.contains(kw)))
                .map(|(_, original)| (*original).clone())
        });
        if let Some(field) = found {
            mappings.insert((*target).to_owned(), field);
        }
    }
    mappings
}

#[must_use]
pub const fn policy_status(status: RobotsStatus) -> PolicyStatus {
    match status {
        RobotsStatus::Allowed => PolicyStatus::Allowed,
        RobotsStatus::Disallowed => PolicyStatus::Disallowed,
        RobotsStatus::Unknown => PolicyStatus::Unknown,
    }
}

/// Builds a config for `url` reading from `source`.
#[must_use]
pub fn generate_config(
    url: &str,
    source: &SetupSource,
    field_mappings: BTreeMap<String, String>,
    robots_status: PolicyStatus,
) -> SiteConfig {
    let (base_url, name) = url::Url::parse(url).map_or_else(
        |_| (url.to_owned(), url.to_owned()),
        |u| {
            let host = u.host_str().unwrap_or_default();
            let netloc = u.port().map_or_else(|| host.to_owned(), |p| format!("{host}:{p}"));
            let path: String = u.path().chars().take(30).collect();
            (format!("{}://{netloc}", u.scheme()), format!("{netloc} - {path}"))
        },
    );

    let (strategy, data_source) = match source {
        SetupSource::Endpoint(endpoint) => {
            let mut ds = DataSource::api(&endpoint.url);
            endpoint.method.clone_into(&mut ds.method);
            (ExtractionStrategy::ApiJson, ds)
        }
        SetupSource::Table(table) => (ExtractionStrategy::DomTable, DataSource::table(&table.selector)),
    };

    let now = Utc::now();
    let mut config = SiteConfig::new(&generate_site_id(url, None), &base_url, url, strategy, data_source)
        .with_name(&name)
        .with_field_mappings(field_mappings);
    config.robots_policy = RobotsPolicy {
        status: robots_status,
        last_checked: Some(now),
        override_approved: false,
    };
    config.metadata.created = Some(now);
    CREATED_BY.clone_into(&mut config.metadata.created_by);
    log::info!("Generated config for site: {}", config.id);
    config
}

/// Best automatic config: the top endpoint as `api_json`, else the
/// largest listed table as `dom_table`.
#[must_use]
pub fn propose_config(discovery: &Discovery, robots_status: PolicyStatus) -> Option<SiteConfig> {
    let sources = list_sources(discovery);
    let source = sources
        .iter()
        .find(|s| matches!(s, SetupSource::Endpoint(_)))
        .or_else(|| {
            sources
                .iter()
                .filter_map(|s| match s {
                    SetupSource::Table(t) => Some((t.num_rows, s)),
                    SetupSource::Endpoint(_) => None,
                })
                .max_by_key(|(rows, _)| *rows)
                .map(|(_, s)| s)
        })?;
    let mappings = suggest_field_mappings(source.field_names());
    Some(generate_config(&discovery.url, source, mappings, robots_status))
}

/// Validates and stores a config.
///
/// # Errors
///
/// Returns [`SourceError::Config`] listing validation problems, or the
/// store's write error.
pub fn save_config(store: &mut ConfigStore, config: SiteConfig) -> Result<SiteConfig, SourceError> {
    let errors = config_store::validate(&config);
    if !errors.is_empty() {
        return Err(SourceError::Config(errors.join("; ")));
    }
    store.upsert(config.clone())?;
    log::info!("Saved config: {}", config.id);
    Ok(config)
}

/// Discovers `url` and stores a config for its best endpoint without
/// asking anything.
///
/// # Errors
///
/// Returns [`SourceError::ComplianceDenied`] when robots.txt disallows the
/// URL or is UNKNOWN without `override_robots`, [`SourceError::Empty`] when
/// no candidate endpoint is found, and discovery or store errors otherwise.
pub async fn setup_non_interactive(
    scraper: &UniversalScraper,
    robots: &RobotsChecker,
    store: &mut ConfigStore,
    url: &str,
    override_robots: bool,
) -> Result<SiteConfig, SourceError> {
    log::info!("Running non-interactive setup for {url}");

    let decision = robots.check(url).await;
    if decision.is_disallowed() {
        return Err(SourceError::ComplianceDenied(format!(
            "Scraping disallowed by robots.txt: {}",
            decision.reason
        )));
    }
    if decision.is_unknown() && !override_robots {
        return Err(SourceError::ComplianceDenied(format!(
            "Robots.txt unknown ({}), use override_robots to proceed",
            decision.reason
        )));
    }

    let discovery = scraper.discover_sources(url).await?;
    let Some(best) = discovery.best() else {
        return Err(SourceError::Empty("No data sources found".to_owned()));
    };

    let source = SetupSource::Endpoint(best.clone());
    let mappings = suggest_field_mappings(source.field_names());
    let config = generate_config(url, &source, mappings, policy_status(decision.status));
    save_config(store, config)
}
