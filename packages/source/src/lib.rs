#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Extraction orchestration.
//!
//! Every scrape walks the same state machine:
//! `DISCOVERING -> FETCHING -> PARSING -> VALIDATING -> SUCCEEDED | FAILED`,
//! driven by [`run_scrape`] over an [`Extractor`]. Retries happen only
//! inside FETCHING (see [`retry`]). [`universal::UniversalScraper`] works on
//! any URL by discovering candidate endpoints first;
//! [`configured::ConfiguredScraper`] reads a known [`SiteConfig`].

pub mod archive;
pub mod batch;
pub mod config_store;
pub mod configured;
pub mod fallback;
pub mod http;
pub mod progress;
pub mod retry;
pub mod setup;
pub mod universal;
pub mod validate;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use data_fetch_browser::BrowserError;
use data_fetch_compliance::{RobotsChecker, RobotsDecision};
use data_fetch_scraper::html_table::{self, TableSelector};
use data_fetch_scraper::json_table::{self, JsonOptions};
use data_fetch_scraper::{ScrapeError, Table, csv_table, js_object};
pub use data_fetch_source_models::{
    ErrorClass, ExtractionStrategy, ScrapeState, SiteConfig, SiteSummary,
};

use crate::archive::OutputPaths;
use crate::retry::RetryPolicy;

/// Errors that can occur while extracting data from a site.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Status code returned.
        status: u16,
        /// URL that was requested.
        url: String,
    },

    /// robots.txt does not permit the scrape.
    #[error("{0}")]
    ComplianceDenied(String),

    /// Parsing the payload failed.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// The browser could not load the page.
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The site configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The site configuration could not be written.
    #[error("Config write error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A site configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Nothing usable was found.
    #[error("{0}")]
    Empty(String),
}

impl SourceError {
    /// Stable class of this error, used to choose a backoff.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Scrape(_) | Self::Toml(_) | Self::TomlSerialize(_) => ErrorClass::Parsing,
            Self::Status { status, .. } => {
                retry::status_class(*status).unwrap_or(ErrorClass::Unknown)
            }
            Self::Http(e) if e.is_timeout() || e.is_connect() => ErrorClass::Network,
            Self::Http(e) => match e.status() {
                Some(status) => {
                    retry::status_class(status.as_u16()).unwrap_or(ErrorClass::Unknown)
                }
                None => retry::classify_message(&e.to_string(), None),
            },
            Self::Browser(BrowserError::Timeout { .. }) => ErrorClass::Network,
            other => retry::classify_message(&other.to_string(), None),
        }
    }
}

// ── Payloads ───────────────────────────────────────────────────────

/// Raw data fetched for one scrape, tagged by the parser that reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// A JSON API body.
    Json {
        endpoint_url: String,
        body: String,
        content_type: Option<String>,
        /// Dot path to the rows inside the body.
        data_path: Option<String>,
    },
    /// A CSV download.
    Csv { endpoint_url: String, body: String },
    /// Rendered HTML read as a table.
    Html {
        url: String,
        html: String,
        /// Specific table; the best-scoring table when `None`.
        selector: Option<TableSelector>,
    },
    /// Rendered HTML carrying data in page JavaScript.
    JsObject {
        url: String,
        html: String,
        variable_name: Option<String>,
    },
}

impl RawPayload {
    /// The raw body as archived to disk.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Json { body, .. } | Self::Csv { body, .. } => body,
            Self::Html { html, .. } | Self::JsObject { html, .. } => html,
        }
    }

    /// URL the payload came from.
    #[must_use]
    pub fn source_url(&self) -> &str {
        match self {
            Self::Json { endpoint_url, .. } | Self::Csv { endpoint_url, .. } => endpoint_url,
            Self::Html { url, .. } | Self::JsObject { url, .. } => url,
        }
    }

    /// Strategy label recorded in result metadata.
    #[must_use]
    pub const fn strategy(&self) -> ExtractionStrategy {
        match self {
            Self::Json { .. } | Self::Csv { .. } => ExtractionStrategy::ApiJson,
            Self::Html { .. } => ExtractionStrategy::DomTable,
            Self::JsObject { .. } => ExtractionStrategy::JsObject,
        }
    }
}

/// Minimum rows for the best-table fallback.
pub const BEST_TABLE_MIN_ROWS: usize = 3;

/// Parses a payload with the matching structural parser, then applies
/// field mappings.
///
/// An HTML payload without a selector takes the best numeric table and
/// falls back to embedded JS data when the page has no usable table.
///
/// # Errors
///
/// Returns [`SourceError::Scrape`] when the parser rejects the payload.
pub fn parse_payload(
    raw: &RawPayload,
    field_mappings: &BTreeMap<String, String>,
) -> Result<Table, SourceError> {
    let table = match raw {
        RawPayload::Json {
            body, data_path, ..
        } => {
            let options = JsonOptions {
                data_path: data_path.clone(),
                field_mappings: field_mappings.clone(),
            };
            return Ok(json_table::extract_str(body, &options)?);
        }
        RawPayload::Csv { body, .. } => csv_table::extract(body)?,
        RawPayload::Html {
            html,
            selector: Some(selector),
            ..
        } => html_table::extract(html, selector)?,
        RawPayload::Html { html, .. } => {
            match html_table::extract_best_table(html, BEST_TABLE_MIN_ROWS, true)? {
                Some(table) => table,
                None => {
                    log::info!("No usable HTML table, trying embedded JavaScript data");
                    js_object::extract(html, None)
                }
            }
        }
        RawPayload::JsObject {
            html,
            variable_name,
            ..
        } => js_object::extract(html, variable_name.as_deref()),
    };

    if field_mappings.is_empty() || table.is_empty() {
        Ok(table)
    } else {
        Ok(json_table::apply_mappings(&table, field_mappings))
    }
}

// ── Extractor ──────────────────────────────────────────────────────

/// Passed to [`Extractor::fetch_raw`] on each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    /// Zero-based attempt index.
    pub index: u32,
    /// Class of the previous failure, if any.
    pub previous: Option<ErrorClass>,
}

/// One way of getting a table out of a site.
///
/// Implementors provide fetching and parsing; [`run_scrape`] supplies the
/// compliance gate, retries, raw archiving and validation.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Identifier used for run ids and archive paths.
    fn site_id(&self) -> &str;

    /// Page URL scraped when the caller gives none.
    fn default_url(&self) -> Option<&str> {
        None
    }

    /// Prepares for fetching `url`. The default does nothing.
    ///
    /// Retried under the same policy as [`Extractor::fetch_raw`], so a
    /// failed discovery must not be cached.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if discovery itself fails.
    async fn discover(&self, _url: &str) -> Result<(), SourceError> {
        Ok(())
    }

    /// Fetches the raw payload for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`]; the class of the error decides whether the
    /// fetch is retried.
    async fn fetch_raw(&self, url: &str) -> Result<RawPayload, SourceError>;

    /// Refreshes credentials after an authentication failure.
    async fn refresh_session(&self) {}

    /// Parses a fetched payload.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the payload cannot be parsed.
    fn parse_raw(&self, raw: &RawPayload) -> Result<Table, SourceError> {
        parse_payload(raw, &BTreeMap::new())
    }

    /// Structural warnings for an extracted table.
    fn validate(&self, table: &Table) -> Vec<String> {
        validate::structural_warnings(table)
    }
}

// ── Orchestration ──────────────────────────────────────────────────

/// Caller-controlled knobs for one scrape.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Proceed when robots.txt status is UNKNOWN.
    pub override_robots: bool,
    /// Persist the raw payload under the output directory.
    pub save_raw: bool,
    pub output: OutputPaths,
    pub retry: RetryPolicy,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            override_robots: false,
            save_raw: true,
            output: OutputPaths::from_env(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScrapeOptions {
    #[must_use]
    pub const fn with_override_robots(mut self, enabled: bool) -> Self {
        self.override_robots = enabled;
        self
    }

    #[must_use]
    pub const fn with_save_raw(mut self, enabled: bool) -> Self {
        self.save_raw = enabled;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputPaths) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcome of one scrape.
///
/// A failed result always has exactly one `error`; warnings never make a
/// result fail.
#[derive(Debug, Clone)]
pub struct ScraperResult {
    pub success: bool,
    /// Terminal state reached.
    pub state: ScrapeState,
    pub data: Option<Table>,
    pub source: String,
    pub url: String,
    pub run_id: String,
    pub rows_extracted: usize,
    /// Min and max of the first date column.
    pub date_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub raw_response_path: Option<PathBuf>,
    pub robots_decision: Option<RobotsDecision>,
    pub validation_warnings: Vec<String>,
    pub error: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ScraperResult {
    fn new(source: &str, url: &str, run_id: String) -> Self {
        Self {
            success: false,
            state: ScrapeState::Discovering,
            data: None,
            source: source.to_owned(),
            url: url.to_owned(),
            run_id,
            rows_extracted: 0,
            date_range: None,
            raw_response_path: None,
            robots_decision: None,
            validation_warnings: Vec::new(),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    fn fail(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        log::error!("Scrape failed: {error}");
        self.success = false;
        self.state = ScrapeState::Failed;
        self.error = Some(error);
        self
    }

    fn enter(&mut self, state: ScrapeState) {
        log::info!("[{}] {} -> {state}", self.run_id, self.state);
        self.state = state;
    }
}

/// Min/max of the first column whose name contains `date`.
#[must_use]
pub fn date_range(table: &Table) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let column = table
        .columns()
        .iter()
        .find(|c| c.to_ascii_lowercase().contains("date"))?;
    let mut stamps = table.column(column).filter_map(data_fetch_scraper::Cell::as_timestamp);
    let first = stamps.next()?;
    Some(stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
}

/// Runs the full scrape state machine for `extractor`.
///
/// Compliance is checked first: DISALLOWED always fails, UNKNOWN fails
/// unless `options.override_robots` is set. Never returns an error; all
/// failures are reported through [`ScraperResult::error`].
pub async fn run_scrape(
    extractor: &dyn Extractor,
    url: Option<&str>,
    robots: &RobotsChecker,
    options: &ScrapeOptions,
) -> ScraperResult {
    let site_id = extractor.site_id().to_owned();
    let run_id = archive::generate_run_id(&site_id);
    let Some(url) = url.or_else(|| extractor.default_url()).map(str::to_owned) else {
        return ScraperResult::new(&site_id, "", run_id)
            .fail("URL must be provided if no config is set");
    };
    let mut result = ScraperResult::new(&site_id, &url, run_id);
    log::info!("Starting scrape: {url} (run_id: {})", result.run_id);

    let decision = robots.check(&url).await;
    result.robots_decision = Some(decision.clone());
    if decision.is_disallowed() {
        return result.fail(format!(
            "Robots.txt disallows scraping: {}",
            decision.reason
        ));
    }
    if decision.is_unknown() {
        if !options.override_robots {
            return result.fail(format!(
                "Robots.txt status UNKNOWN: {}. Use --override-robots to proceed at your own risk",
                decision.reason
            ));
        }
        log::warn!("Robots.txt status UNKNOWN, proceeding with override: {}", decision.reason);
    }

    let discovered = retry::with_retry(&options.retry, |_| extractor.discover(&url)).await;
    if let Err(e) = discovered {
        return result.fail(e.to_string());
    }

    result.enter(ScrapeState::Fetching);
    let refreshed = AtomicBool::new(false);
    let fetched = retry::with_retry(&options.retry, |attempt: FetchAttempt| {
        let url = url.as_str();
        let refreshed = &refreshed;
        async move {
            if attempt.previous == Some(ErrorClass::Auth) && !refreshed.swap(true, Ordering::SeqCst) {
                log::info!("Refreshing session after authentication failure");
                extractor.refresh_session().await;
            }
            extractor.fetch_raw(url).await
        }
    })
    .await;
    let raw = match fetched {
        Ok(raw) => raw,
        Err(e) => return result.fail(e.to_string()),
    };
    result.metadata.insert(
        "strategy".to_owned(),
        serde_json::Value::String(raw.strategy().to_string()),
    );
    result.metadata.insert(
        "data_url".to_owned(),
        serde_json::Value::String(raw.source_url().to_owned()),
    );

    if options.save_raw {
        match archive::save_raw_response(
            &options.output,
            raw.content().as_bytes(),
            "response",
            &site_id,
            &result.run_id,
        ) {
            Ok(path) => {
                log::info!("Saved raw response to {}", path.display());
                result.raw_response_path = Some(path);
            }
            Err(e) => log::warn!("Could not save raw response: {e}"),
        }
    }

    result.enter(ScrapeState::Parsing);
    let table = match extractor.parse_raw(&raw) {
        Ok(table) if !table.is_empty() => table,
        Ok(_) => return result.fail("No data extracted"),
        Err(e) => return result.fail(e.to_string()),
    };

    result.enter(ScrapeState::Validating);
    let warnings = extractor.validate(&table);
    if !warnings.is_empty() {
        log::warn!("Validation warnings: {warnings:?}");
    }
    result.validation_warnings = warnings;

    result.rows_extracted = table.len();
    result.date_range = date_range(&table);
    result.data = Some(table);
    result.success = true;
    result.enter(ScrapeState::Succeeded);
    log::info!("Scrape successful: {} rows extracted", result.rows_extracted);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use data_fetch_compliance::RobotsChecker;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    struct Canned {
        body: &'static str,
        failures: AtomicU32,
        fail_with: fn() -> SourceError,
        refreshed: AtomicU32,
    }

    impl Canned {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                failures: AtomicU32::new(0),
                fail_with: || SourceError::Empty("never".to_owned()),
                refreshed: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Extractor for Canned {
        fn site_id(&self) -> &str {
            "canned"
        }

        async fn fetch_raw(&self, url: &str) -> Result<RawPayload, SourceError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err((self.fail_with)());
            }
            Ok(RawPayload::Json {
                endpoint_url: url.to_owned(),
                body: self.body.to_owned(),
                content_type: Some("application/json".to_owned()),
                data_path: None,
            })
        }

        async fn refresh_session(&self) {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn robots_server(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn quick_options(dir: &std::path::Path) -> ScrapeOptions {
        ScrapeOptions::default()
            .with_output(OutputPaths::new(dir))
            .with_retry(
                RetryPolicy::default()
                    .with_base_delay(Duration::ZERO)
                    .with_jitter(false),
            )
    }

    #[tokio::test]
    async fn successful_scrape_walks_every_state() {
        let server = robots_server("", 404).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = Canned::new(r#"[{"date":"2024-01-01","v":1},{"date":"2024-01-03","v":2}]"#);
        let url = format!("{}/charts", server.uri());

        let result = run_scrape(
            &extractor,
            Some(&url),
            &RobotsChecker::new().unwrap(),
            &quick_options(dir.path()),
        )
        .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.state, ScrapeState::Succeeded);
        assert_eq!(result.rows_extracted, 2);
        assert!(result.error.is_none());
        let (lo, hi) = result.date_range.unwrap();
        assert!(lo < hi);
        let raw = result.raw_response_path.unwrap();
        assert!(raw.starts_with(dir.path()));
        assert_eq!(raw.extension().unwrap(), "json");
    }

    #[tokio::test]
    async fn disallowed_is_fatal_and_skips_fetch() {
        let server = robots_server("User-agent: *\nDisallow: /", 200).await;
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = Canned::new("[]");
        extractor.failures = AtomicU32::new(100);

        let result = run_scrape(
            &extractor,
            Some(&format!("{}/charts", server.uri())),
            &RobotsChecker::new().unwrap(),
            &quick_options(dir.path()),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.state, ScrapeState::Failed);
        assert!(result.error.unwrap().starts_with("Robots.txt disallows scraping"));
        assert_eq!(extractor.failures.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn unknown_robots_needs_override() {
        let server = robots_server("", 500).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = Canned::new(r#"[{"date":"2024-01-01","v":1}]"#);
        let url = format!("{}/charts", server.uri());
        let robots = RobotsChecker::new().unwrap();

        let blocked = run_scrape(&extractor, Some(&url), &robots, &quick_options(dir.path())).await;
        assert!(!blocked.success);
        assert!(blocked.error.unwrap().contains("UNKNOWN"));

        let options = quick_options(dir.path()).with_override_robots(true);
        let allowed = run_scrape(&extractor, Some(&url), &robots, &options).await;
        assert!(allowed.success);
    }

    #[tokio::test]
    async fn empty_table_is_a_failure() {
        let server = robots_server("", 404).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = Canned::new("[]");

        let result = run_scrape(
            &extractor,
            Some(&format!("{}/x", server.uri())),
            &RobotsChecker::new().unwrap(),
            &quick_options(dir.path()),
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No data extracted"));
    }

    #[tokio::test]
    async fn first_auth_failure_refreshes_session() {
        let server = robots_server("", 404).await;
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = Canned::new(r#"[{"v":1}]"#);
        extractor.failures = AtomicU32::new(2);
        extractor.fail_with = || SourceError::Status {
            status: 401,
            url: "https://x".to_owned(),
        };

        let result = run_scrape(
            &extractor,
            Some(&format!("{}/x", server.uri())),
            &RobotsChecker::new().unwrap(),
            &quick_options(dir.path()),
        )
        .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(extractor.refreshed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parse_errors_are_not_retried() {
        let server = robots_server("", 404).await;
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = Canned::new("[]");
        extractor.failures = AtomicU32::new(2);
        extractor.fail_with = || SourceError::Scrape(ScrapeError::Parse("bad".to_owned()));

        let result = run_scrape(
            &extractor,
            Some(&format!("{}/x", server.uri())),
            &RobotsChecker::new().unwrap(),
            &quick_options(dir.path()),
        )
        .await;

        assert!(!result.success);
        assert_eq!(extractor.failures.load(Ordering::SeqCst), 1);
    }

    /// Fails with each scripted error in turn, then succeeds.
    struct Scripted {
        errors: std::sync::Mutex<Vec<SourceError>>,
        refreshed: AtomicU32,
    }

    #[async_trait]
    impl Extractor for Scripted {
        fn site_id(&self) -> &str {
            "scripted"
        }

        async fn fetch_raw(&self, url: &str) -> Result<RawPayload, SourceError> {
            if let Some(error) = self.errors.lock().unwrap().pop() {
                return Err(error);
            }
            Ok(RawPayload::Json {
                endpoint_url: url.to_owned(),
                body: r#"[{"v":1}]"#.to_owned(),
                content_type: None,
                data_path: None,
            })
        }

        async fn refresh_session(&self) {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn late_auth_failure_still_refreshes_session() {
        let server = robots_server("", 404).await;
        let dir = tempfile::tempdir().unwrap();
        // Popped from the back: network first, then auth.
        let extractor = Scripted {
            errors: std::sync::Mutex::new(vec![
                SourceError::Status {
                    status: 401,
                    url: "https://x/api".to_owned(),
                },
                SourceError::Empty("connection reset by peer".to_owned()),
            ]),
            refreshed: AtomicU32::new(0),
        };

        let result = run_scrape(
            &extractor,
            Some(&format!("{}/x", server.uri())),
            &RobotsChecker::new().unwrap(),
            &quick_options(dir.path()),
        )
        .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(extractor.refreshed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_class_ignores_url_text() {
        let status = |status, url: &str| SourceError::Status {
            status,
            url: url.to_owned(),
        }
        .class();

        assert_eq!(status(404, "https://x.com/api/data.json"), ErrorClass::Unknown);
        assert_eq!(status(404, "https://x.com/auth/token"), ErrorClass::Unknown);
        assert_eq!(status(400, "https://x.com/ratelimit/parse"), ErrorClass::Unknown);
        assert_eq!(status(401, "https://x.com/data.json"), ErrorClass::Auth);
        assert_eq!(status(503, "https://x.com/json"), ErrorClass::Network);
        assert!(status(404, "https://x.com/data.json").is_retryable());
    }

    #[test]
    fn errors_classify_by_variant() {
        assert_eq!(
            SourceError::Scrape(ScrapeError::Lookup("x".to_owned())).class(),
            ErrorClass::Parsing
        );
        assert_eq!(
            SourceError::Status { status: 429, url: String::new() }.class(),
            ErrorClass::RateLimit
        );
        assert_eq!(
            SourceError::Status { status: 403, url: String::new() }.class(),
            ErrorClass::BotDetection
        );
        assert_eq!(
            SourceError::Browser(BrowserError::Timeout { what: "nav".to_owned(), ms: 1 }).class(),
            ErrorClass::Network
        );
    }

    #[test]
    fn html_payload_uses_selector_or_best_table() {
        let rows: String = (0..4)
            .map(|i| format!("<tr><td>2024-01-0{}</td><td>{}</td></tr>", i + 1, i * 10))
            .collect();
        let html = format!(
            "<table id=\"t\"><thead><tr><th>Date</th><th>Close</th></tr></thead><tbody>{rows}</tbody></table>"
        );
        let raw = RawPayload::Html {
            url: "https://x".to_owned(),
            html: html.clone(),
            selector: None,
        };
        let table = parse_payload(&raw, &BTreeMap::new()).unwrap();
        assert_eq!(table.len(), 4);

        let mut mappings = BTreeMap::new();
        mappings.insert("close".to_owned(), "Close".to_owned());
        let raw = RawPayload::Html {
            url: "https://x".to_owned(),
            html,
            selector: Some(TableSelector::Css("#t".to_owned())),
        };
        let table = parse_payload(&raw, &mappings).unwrap();
        assert_eq!(table.columns(), ["close", "Date"]);
    }
}
