#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the page loader: captured [`NetworkResponse`]s, the
//! [`PageLoadResult`] of one navigation, and the [`LoadOptions`] that
//! control waiting and capture.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// URL fragments that mark a response as tracking/asset noise rather than
/// data. Bodies of matching responses are never captured.
pub const CAPTURE_DENYLIST: &[&str] = &[
    "analytics",
    "tracking",
    "pixel",
    "beacon",
    "facebook",
    "google-analytics",
    "clarity",
    "fonts",
    "icons",
    ".css",
    ".js",
    "cookie",
    "consent",
    "recaptcha",
];

/// One HTTP exchange observed while a page loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResponse {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Browser resource type (`xhr`, `fetch`, `document`, ...).
    pub resource_type: String,
    /// Response status, if a response arrived.
    pub status: Option<u16>,
    /// `Content-Type` header value.
    pub content_type: Option<String>,
    /// `Content-Length` header value (or encoded length).
    pub content_length: Option<u64>,
    /// Raw body, captured only for data responses.
    pub body: Option<Vec<u8>>,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
}

impl NetworkResponse {
    /// Creates a response record with just a URL and status.
    #[must_use]
    pub fn new(url: &str, status: u16) -> Self {
        Self {
            url: url.to_owned(),
            method: "GET".to_owned(),
            resource_type: "fetch".to_owned(),
            status: Some(status),
            ..Self::default()
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    /// Sets the body and its length.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.content_length = Some(body.len() as u64);
        self.body = Some(body);
        self
    }

    /// Overrides the reported content length.
    #[must_use]
    pub const fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    fn content_type_contains(&self, needle: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(needle))
    }

    /// `true` for JSON content types.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type_contains("json")
    }

    /// `true` for HTML content types.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type_contains("html")
    }

    /// `true` for CSV content types.
    #[must_use]
    pub fn is_csv(&self) -> bool {
        self.content_type_contains("csv")
    }

    /// `true` when the URL contains a denylisted tracking/asset fragment.
    #[must_use]
    pub fn is_denylisted(&self) -> bool {
        let url = self.url.to_ascii_lowercase();
        CAPTURE_DENYLIST.iter().any(|needle| url.contains(needle))
    }

    /// Whether this response might carry data worth keeping the body of:
    /// JSON, CSV or HTML with status 200, not on the denylist.
    #[must_use]
    pub fn is_data_response(&self) -> bool {
        (self.is_json() || self.is_csv() || self.is_html())
            && self.status == Some(200)
            && !self.is_denylisted()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Keeps only responses that look like data endpoints.
#[must_use]
pub fn filter_data_requests(responses: &[NetworkResponse]) -> Vec<&NetworkResponse> {
    responses.iter().filter(|r| r.is_data_response()).collect()
}

/// Everything captured from one page load.
///
/// Navigation failures are recorded in `error`; `html` is empty in that
/// case, so callers must check `error` first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLoadResult {
    /// The URL that was requested.
    pub url: String,
    /// Final DOM serialized as HTML.
    pub html: String,
    /// Document title.
    pub title: String,
    /// Responses in arrival order.
    pub network_responses: Vec<NetworkResponse>,
    /// Navigation error, if any.
    pub error: Option<String>,
    /// Wall-clock load time.
    pub load_time_ms: u64,
}

impl PageLoadResult {
    /// A result for a navigation that failed before any content loaded.
    #[must_use]
    pub fn failed(url: &str, error: String, load_time_ms: u64) -> Self {
        Self {
            url: url.to_owned(),
            error: Some(error),
            load_time_ms,
            ..Self::default()
        }
    }

    /// `true` when navigation succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Controls how a page is loaded and what is captured.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// CSS selector that marks the page as ready.
    pub wait_for_selector: Option<String>,
    /// Extra wait after load, and the timeout for optional waits (ms).
    pub wait_for_timeout_ms: u64,
    /// JS global that must be defined before the page counts as ready.
    pub wait_for_js_variable: Option<String>,
    /// Wait for the network to go quiet after navigation.
    pub wait_for_network_idle: bool,
    /// Poll the page for data-loaded indicators.
    pub wait_for_data_loaded: bool,
    /// Record network responses.
    pub capture_network: bool,
    /// Record bodies of data responses.
    pub capture_response_bodies: bool,
    /// Apply fingerprint randomisation and pre-navigation scripts.
    pub use_stealth: bool,
    /// Navigation timeout (ms).
    pub navigation_timeout_ms: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            wait_for_selector: None,
            wait_for_timeout_ms: 5000,
            wait_for_js_variable: None,
            wait_for_network_idle: true,
            wait_for_data_loaded: false,
            capture_network: true,
            capture_response_bodies: true,
            use_stealth: true,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl LoadOptions {
    /// Sets the ready selector.
    #[must_use]
    pub fn with_selector(mut self, selector: &str) -> Self {
        self.wait_for_selector = Some(selector.to_owned());
        self
    }

    /// Sets the JS global to wait for.
    #[must_use]
    pub fn with_js_variable(mut self, variable: &str) -> Self {
        self.wait_for_js_variable = Some(variable.to_owned());
        self
    }

    /// Enables or disables stealth mode.
    #[must_use]
    pub const fn with_stealth(mut self, enabled: bool) -> Self {
        self.use_stealth = enabled;
        self
    }

    /// Enables data-loaded polling.
    #[must_use]
    pub const fn with_data_loaded_wait(mut self, enabled: bool) -> Self {
        self.wait_for_data_loaded = enabled;
        self
    }

    /// Sets the post-load wait / optional-wait timeout.
    #[must_use]
    pub const fn with_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.wait_for_timeout_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_response_is_data() {
        let r = NetworkResponse::new("https://site.com/api/prices", 200)
            .with_content_type("application/json; charset=utf-8");
        assert!(r.is_json());
        assert!(r.is_data_response());
    }

    #[test]
    fn tracking_urls_are_not_data() {
        let r = NetworkResponse::new("https://www.google-analytics.com/collect", 200)
            .with_content_type("application/json");
        assert!(!r.is_data_response());
    }

    #[test]
    fn non_200_is_not_data() {
        let r = NetworkResponse::new("https://site.com/data.csv", 404).with_content_type("text/csv");
        assert!(r.is_csv());
        assert!(!r.is_data_response());
    }

    #[test]
    fn scripts_are_not_data() {
        let r = NetworkResponse::new("https://site.com/bundle.js", 200)
            .with_content_type("text/html");
        assert!(!r.is_data_response());
    }

    #[test]
    fn body_text_is_lossy() {
        let r = NetworkResponse::new("https://site.com/x", 200).with_body(vec![b'o', b'k', 0xFF]);
        assert_eq!(r.body_text().unwrap(), "ok\u{FFFD}");
        assert_eq!(r.content_length, Some(3));
    }

    #[test]
    fn filter_keeps_only_data() {
        let responses = vec![
            NetworkResponse::new("https://site.com/api/series", 200)
                .with_content_type("application/json"),
            NetworkResponse::new("https://site.com/logo.png", 200).with_content_type("image/png"),
        ];
        let kept = filter_data_requests(&responses);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://site.com/api/series");
    }
}
