#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Page loading for data discovery.
//!
//! A [`PageLoader`] navigates to a URL, records every network response it
//! sees, keeps the bodies of data-looking responses, and returns the final
//! DOM. The Chromium implementation lives behind the `chromium` feature;
//! [`StaticPageLoader`] replays canned results for tests and offline use.

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod stealth;
pub mod waits;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
pub use data_fetch_browser_models::{
    CAPTURE_DENYLIST, LoadOptions, NetworkResponse, PageLoadResult, filter_data_requests,
};

/// Errors that stop a page load before navigation can even be attempted.
///
/// Navigation failures themselves are reported through
/// [`PageLoadResult::error`].
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// The browser binary could not be found or started.
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Navigation could not be set up.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// A DevTools protocol command failed.
    #[error("CDP error: {0}")]
    Cdp(String),

    /// An operation exceeded its deadline.
    #[error("Timed out after {ms}ms: {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// The deadline in milliseconds.
        ms: u64,
    },
}

/// Loads a page and captures its network traffic.
#[async_trait]
pub trait PageLoader: Send + Sync {
    /// Navigates to `url` using `options`.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError`] when the browser itself is unusable. A page
    /// that fails to load yields `Ok` with [`PageLoadResult::error`] set.
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<PageLoadResult, BrowserError>;
}

/// Replays canned [`PageLoadResult`]s keyed by URL.
///
/// Unknown URLs produce a failed result. Every call is counted so callers
/// can assert how many loads happened.
#[derive(Debug, Default)]
pub struct StaticPageLoader {
    pages: BTreeMap<String, PageLoadResult>,
    loads: AtomicUsize,
}

impl StaticPageLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the result returned for `url`.
    #[must_use]
    pub fn with_page(mut self, url: &str, mut result: PageLoadResult) -> Self {
        result.url = url.to_owned();
        self.pages.insert(url.to_owned(), result);
        self
    }

    /// Registers an HTML-only page with no network traffic.
    #[must_use]
    pub fn with_html(self, url: &str, html: &str) -> Self {
        self.with_page(
            url,
            PageLoadResult {
                html: html.to_owned(),
                ..PageLoadResult::default()
            },
        )
    }

    /// Number of `load` calls so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageLoader for StaticPageLoader {
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<PageLoadResult, BrowserError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let Some(page) = self.pages.get(url) else {
            return Ok(PageLoadResult::failed(
                url,
                format!("net::ERR_NAME_NOT_RESOLVED at {url}"),
                0,
            ));
        };

        let mut page = page.clone();
        if !options.capture_network {
            page.network_responses.clear();
        } else if !options.capture_response_bodies {
            for response in &mut page.network_responses {
                response.body = None;
            }
        } else {
            for response in &mut page.network_responses {
                if !response.is_data_response() {
                    response.body = None;
                }
            }
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_traffic() -> PageLoadResult {
        PageLoadResult {
            html: "<html><title>x</title></html>".to_owned(),
            title: "x".to_owned(),
            network_responses: vec![
                NetworkResponse::new("https://site.com/api/chart", 200)
                    .with_content_type("application/json")
                    .with_body(r#"[{"date":"2024-01-01"}]"#),
                NetworkResponse::new("https://site.com/pixel.gif", 200)
                    .with_content_type("image/gif")
                    .with_body(vec![0u8; 4]),
            ],
            ..PageLoadResult::default()
        }
    }

    #[tokio::test]
    async fn static_loader_replays_and_counts() {
        let loader = StaticPageLoader::new().with_page("https://site.com", page_with_traffic());
        let result = loader
            .load("https://site.com", &LoadOptions::default())
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(result.url, "https://site.com");
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn static_loader_drops_non_data_bodies() {
        let loader = StaticPageLoader::new().with_page("https://site.com", page_with_traffic());
        let result = loader
            .load("https://site.com", &LoadOptions::default())
            .await
            .unwrap();
        assert!(result.network_responses[0].body.is_some());
        assert!(result.network_responses[1].body.is_none());
    }

    #[tokio::test]
    async fn unknown_url_is_a_failed_result_not_an_error() {
        let loader = StaticPageLoader::new();
        let result = loader
            .load("https://nowhere.invalid", &LoadOptions::default())
            .await
            .unwrap();
        assert!(!result.is_ok());
        assert!(result.html.is_empty());
    }

    #[tokio::test]
    async fn capture_can_be_disabled() {
        let loader = StaticPageLoader::new().with_page("https://site.com", page_with_traffic());
        let options = LoadOptions {
            capture_network: false,
            ..LoadOptions::default()
        };
        let result = loader.load("https://site.com", &options).await.unwrap();
        assert!(result.network_responses.is_empty());
    }
}
