#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! robots.txt compliance gate.
//!
//! [`RobotsChecker::check`] fetches `{scheme}://{host}/robots.txt` for a
//! target URL and produces a [`RobotsDecision`]:
//!
//! * HTTP 200 → the file is parsed and the target path evaluated.
//! * HTTP 404 → [`RobotsStatus::Allowed`] (no policy published).
//! * Anything else (timeouts, connection errors, other statuses) →
//!   [`RobotsStatus::Unknown`].
//!
//! URLs that look like API endpoints skip the check entirely and are
//! reported as allowed.

pub mod robots;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::Mutex;

pub use robots::RobotsRules;

/// User agent sent with robots.txt requests and matched against groups.
pub const DEFAULT_USER_AGENT: &str = "DataFetchBot/1.0";

/// Timeout for a single robots.txt fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while setting up compliance checks.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    /// Building the HTTP client failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Verdict of a robots.txt check.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotsStatus {
    /// The path may be fetched.
    Allowed,
    /// robots.txt forbids the path.
    Disallowed,
    /// robots.txt could not be retrieved or evaluated.
    Unknown,
}

/// Outcome of checking one URL against its host's robots.txt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsDecision {
    /// The verdict.
    pub status: RobotsStatus,
    /// Human-readable explanation.
    pub reason: String,
    /// The robots.txt URL that was consulted, if any.
    pub robots_url: Option<String>,
    /// Raw robots.txt body when it was fetched successfully.
    pub raw_robots: Option<String>,
}

impl RobotsDecision {
    fn new(status: RobotsStatus, reason: impl Into<String>, robots_url: Option<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            robots_url,
            raw_robots: None,
        }
    }

    /// `true` when scraping may proceed without an override.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.status == RobotsStatus::Allowed
    }

    /// `true` when robots.txt forbids the path.
    #[must_use]
    pub fn is_disallowed(&self) -> bool {
        self.status == RobotsStatus::Disallowed
    }

    /// `true` when the policy could not be determined.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.status == RobotsStatus::Unknown
    }
}

/// Result of fetching a robots.txt file.
#[derive(Debug, Clone)]
enum RobotsFetch {
    Found(String),
    Missing,
    Failed(String),
}

/// Fetches and evaluates robots.txt files.
///
/// Parsed files are cached per origin for the lifetime of the checker, so
/// [`RobotsChecker::check_many`] hits each host once.
pub struct RobotsChecker {
    client: reqwest::Client,
    user_agent: String,
    cache: Mutex<BTreeMap<String, RobotsFetch>>,
}

impl RobotsChecker {
    /// Creates a checker with the default user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::Http`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ComplianceError> {
        Self::with_options(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }

    /// Creates a checker with a custom user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::Http`] if the HTTP client cannot be built.
    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self, ComplianceError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            user_agent: user_agent.to_owned(),
            cache: Mutex::new(BTreeMap::new()),
        })
    }

    /// The user agent this checker evaluates rules for.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Checks whether `url` may be scraped.
    ///
    /// Never fails: unparseable URLs and fetch problems are reported as
    /// [`RobotsStatus::Unknown`].
    pub async fn check(&self, url: &str) -> RobotsDecision {
        let parsed = match url::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return RobotsDecision::new(
                    RobotsStatus::Unknown,
                    format!("Invalid URL: {e}"),
                    None,
                );
            }
        };

        let origin = parsed.origin().ascii_serialization();
        let robots_url = format!("{origin}/robots.txt");
        let path = if parsed.path().is_empty() {
            "/"
        } else {
            parsed.path()
        };

        if is_api_endpoint(&parsed) {
            log::info!("Skipping robots.txt check for API endpoint: {url}");
            return RobotsDecision::new(
                RobotsStatus::Allowed,
                "API endpoint - robots.txt check skipped (APIs have their own access controls)",
                None,
            );
        }

        log::info!("Checking robots.txt for {origin}");
        let fetched = self.fetch_cached(&origin, &robots_url).await;
        evaluate(&fetched, &self.user_agent, path, robots_url)
    }

    /// Checks several URLs, fetching each host's robots.txt once.
    pub async fn check_many(&self, urls: &[String]) -> BTreeMap<String, RobotsDecision> {
        let mut results = BTreeMap::new();
        for url in urls {
            let decision = self.check(url).await;
            results.insert(url.clone(), decision);
        }
        results
    }

    async fn fetch_cached(&self, origin: &str, robots_url: &str) -> RobotsFetch {
        if let Some(hit) = self.cache.lock().await.get(origin) {
            return hit.clone();
        }
        let fetched = self.fetch(robots_url).await;
        self.cache
            .lock()
            .await
            .insert(origin.to_owned(), fetched.clone());
        fetched
    }

    async fn fetch(&self, robots_url: &str) -> RobotsFetch {
        let response = match self.client.get(robots_url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return RobotsFetch::Failed(format!("Timeout fetching {robots_url}"));
            }
            Err(e) if e.is_connect() => {
                return RobotsFetch::Failed(format!("Connection error: {e}"));
            }
            Err(e) => return RobotsFetch::Failed(format!("Request error: {e}")),
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return RobotsFetch::Missing;
        }
        if status != reqwest::StatusCode::OK {
            return RobotsFetch::Failed(format!("HTTP {status}"));
        }

        match response.text().await {
            Ok(body) => RobotsFetch::Found(body),
            Err(e) => RobotsFetch::Failed(format!("Request error: {e}")),
        }
    }
}

/// Returns `true` for URLs treated as API endpoints (exempt from robots.txt).
#[must_use]
pub fn is_api_endpoint(url: &url::Url) -> bool {
    let path = url.path();
    let host = url.host_str().unwrap_or_default();
    path.contains("/api/") || path.starts_with("/api") || host.starts_with("api.")
}

fn evaluate(
    fetched: &RobotsFetch,
    user_agent: &str,
    path: &str,
    robots_url: String,
) -> RobotsDecision {
    match fetched {
        RobotsFetch::Failed(error) => {
            log::warn!("Could not fetch robots.txt: {error}");
            RobotsDecision::new(
                RobotsStatus::Unknown,
                format!("Could not fetch robots.txt: {error}"),
                Some(robots_url),
            )
        }
        RobotsFetch::Missing => RobotsDecision::new(
            RobotsStatus::Allowed,
            "No robots.txt found - allowed by default",
            Some(robots_url),
        ),
        RobotsFetch::Found(body) => {
            let rules = RobotsRules::parse(body);
            let mut decision = if rules.is_allowed(user_agent, path) {
                log::info!("Scraping allowed for {path}");
                RobotsDecision::new(
                    RobotsStatus::Allowed,
                    format!("Path {path} is allowed in robots.txt"),
                    Some(robots_url),
                )
            } else {
                log::warn!("Scraping disallowed for {path}");
                RobotsDecision::new(
                    RobotsStatus::Disallowed,
                    format!("Path {path} is disallowed in robots.txt"),
                    Some(robots_url),
                )
            };
            decision.raw_robots = Some(body.clone());
            decision
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn serve_robots(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn missing_robots_is_allowed() {
        let server = serve_robots(404, "").await;
        let checker = RobotsChecker::new().unwrap();
        let decision = checker.check(&format!("{}/data/chart", server.uri())).await;
        assert_eq!(decision.status, RobotsStatus::Allowed);
        assert_eq!(decision.reason, "No robots.txt found - allowed by default");
        assert!(decision.raw_robots.is_none());
    }

    #[tokio::test]
    async fn server_error_is_unknown() {
        let server = serve_robots(503, "").await;
        let checker = RobotsChecker::new().unwrap();
        let decision = checker.check(&format!("{}/data", server.uri())).await;
        assert!(decision.is_unknown());
        assert!(decision.reason.contains("503"));
    }

    #[tokio::test]
    async fn disallowed_path_is_reported() {
        let server = serve_robots(200, "User-agent: *\nDisallow: /private\n").await;
        let checker = RobotsChecker::new().unwrap();

        let denied = checker.check(&format!("{}/private/x", server.uri())).await;
        assert!(denied.is_disallowed());
        assert!(denied.raw_robots.is_some());

        let allowed = checker.check(&format!("{}/public", server.uri())).await;
        assert!(allowed.is_allowed());
    }

    #[tokio::test]
    async fn robots_is_fetched_once_per_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\n"))
            .expect(1)
            .mount(&server)
            .await;

        let checker = RobotsChecker::new().unwrap();
        let urls = vec![
            format!("{}/a", server.uri()),
            format!("{}/b", server.uri()),
        ];
        let results = checker.check_many(&urls).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(RobotsDecision::is_allowed));
    }

    #[tokio::test]
    async fn api_endpoints_bypass_the_check() {
        let checker = RobotsChecker::new().unwrap();
        let decision = checker
            .check("https://example.invalid/api/v1/series?asset=btc")
            .await;
        assert!(decision.is_allowed());
        assert!(decision.robots_url.is_none());

        let host = url::Url::parse("https://api.example.com/v3/coins").unwrap();
        assert!(is_api_endpoint(&host));
    }

    #[tokio::test]
    async fn invalid_url_is_unknown() {
        let checker = RobotsChecker::new().unwrap();
        let decision = checker.check("not a url").await;
        assert!(decision.is_unknown());
    }

    #[test]
    fn status_round_trips_through_strum() {
        assert_eq!(RobotsStatus::Disallowed.to_string(), "DISALLOWED");
        assert_eq!("UNKNOWN".parse::<RobotsStatus>().unwrap(), RobotsStatus::Unknown);
    }
}
