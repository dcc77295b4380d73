//! Sequential scraping of several configured sites.
//!
//! Sites are scraped one at a time so per-host rate limits hold. A failing
//! site is logged and recorded; the rest of the batch still runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use data_fetch_browser::{LoadOptions, PageLoader};
use data_fetch_compliance::RobotsChecker;
use data_fetch_scraper::Table;

use crate::configured::ConfiguredScraper;
use crate::progress::ProgressCallback;
use crate::{ScrapeOptions, ScraperResult, SiteConfig, SourceError, run_scrape};

/// Tables from the sites that succeeded and errors from the rest.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub tables: BTreeMap<String, Table>,
    pub failures: BTreeMap<String, String>,
}

impl BatchOutcome {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.tables.len()
    }
}

/// Scrapes configured sites by id.
pub struct RealtimeScraper {
    sites: Vec<SiteConfig>,
    loader: Arc<dyn PageLoader>,
    client: reqwest::Client,
    robots: Arc<RobotsChecker>,
    options: ScrapeOptions,
    load_options: LoadOptions,
}

impl RealtimeScraper {
    #[must_use]
    pub fn new(
        sites: Vec<SiteConfig>,
        loader: Arc<dyn PageLoader>,
        client: reqwest::Client,
        robots: Arc<RobotsChecker>,
        options: ScrapeOptions,
    ) -> Self {
        Self {
            sites,
            loader,
            client,
            robots,
            options,
            load_options: LoadOptions::default(),
        }
    }

    #[must_use]
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    #[must_use]
    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    /// Scrapes one site. A site whose stored robots policy has an approved
    /// override proceeds on UNKNOWN robots.txt.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if `site_id` is not configured.
    pub async fn scrape_site(&self, site_id: &str) -> Result<ScraperResult, SourceError> {
        let config = self
            .sites
            .iter()
            .find(|s| s.id == site_id)
            .cloned()
            .ok_or_else(|| SourceError::Config(format!("Site '{site_id}' not found in config")))?;

        let options = self
            .options
            .clone()
            .with_override_robots(self.options.override_robots || config.robots_policy.override_approved);
        let scraper = ConfiguredScraper::new(config, Arc::clone(&self.loader), self.client.clone())
            .with_load_options(self.load_options.clone());
        Ok(run_scrape(&scraper, None, &self.robots, &options).await)
    }

    /// Scrapes `site_ids` in order, never stopping early.
    pub async fn scrape_sites(&self, site_ids: &[String], progress: &dyn ProgressCallback) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        progress.set_total(site_ids.len() as u64);
        log::info!("Scraping {} sites", site_ids.len());

        for site_id in site_ids {
            progress.set_message(format!("Scraping {site_id}"));
            match self.scrape_site(site_id).await {
                Ok(result) if result.success => {
                    if let Some(table) = result.data {
                        log::info!("Successfully scraped {} rows from {site_id}", table.len());
                        outcome.tables.insert(site_id.clone(), table);
                    }
                }
                Ok(result) => {
                    let error = result.error.unwrap_or_else(|| "No data extracted".to_owned());
                    log::warn!("No data extracted from {site_id}: {error}");
                    outcome.failures.insert(site_id.clone(), error);
                }
                Err(e) => {
                    log::error!("Error scraping {site_id}: {e}");
                    outcome.failures.insert(site_id.clone(), e.to_string());
                }
            }
            progress.inc(1);
        }

        let summary = format!("Successfully scraped {}/{} sites", outcome.succeeded(), site_ids.len());
        log::info!("{summary}");
        progress.finish(summary);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use data_fetch_browser::StaticPageLoader;
    use data_fetch_source_models::DataSource;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::ExtractionStrategy;
    use crate::archive::OutputPaths;
    use crate::http;
    use crate::retry::RetryPolicy;

    #[derive(Default)]
    struct Recording {
        total: AtomicU64,
        done: AtomicU64,
        finished: Mutex<Option<String>>,
    }

    impl ProgressCallback for Recording {
        fn set_total(&self, total: u64) {
            self.total.store(total, Ordering::SeqCst);
        }
        fn inc(&self, delta: u64) {
            self.done.fetch_add(delta, Ordering::SeqCst);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, msg: String) {
            *self.finished.lock().unwrap() = Some(msg);
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/volume"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"[{"date":"2024-01-01","volume":3}]"#),
            )
            .mount(&server)
            .await;

        let page = format!("{}/page", server.uri());
        let good = SiteConfig::new(
            "good_btc",
            &server.uri(),
            &page,
            ExtractionStrategy::ApiJson,
            DataSource::api(&format!("{}/api/volume", server.uri())),
        );
        let broken = SiteConfig::new(
            "broken_btc",
            &server.uri(),
            &page,
            ExtractionStrategy::ApiJson,
            DataSource::api(&format!("{}/api/missing", server.uri())),
        );

        let dir = tempfile::tempdir().unwrap();
        let options = ScrapeOptions::default()
            .with_output(OutputPaths::new(dir.path()))
            .with_retry(
                RetryPolicy::default()
                    .with_max_retries(1)
                    .with_base_delay(Duration::ZERO)
                    .with_jitter(false),
            );
        let scraper = RealtimeScraper::new(
            vec![good, broken],
            Arc::new(StaticPageLoader::new()),
            http::client("DataFetchBot/1.0", http::DEFAULT_TIMEOUT).unwrap(),
            Arc::new(RobotsChecker::new().unwrap()),
            options,
        );

        let progress = Recording::default();
        let ids = vec!["broken_btc".to_owned(), "unknown".to_owned(), "good_btc".to_owned()];
        let outcome = scraper.scrape_sites(&ids, &progress).await;

        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(outcome.tables["good_btc"].len(), 1);
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failures["broken_btc"].contains("404"));
        assert!(outcome.failures["unknown"].contains("not found"));
        assert_eq!(progress.total.load(Ordering::SeqCst), 3);
        assert_eq!(progress.done.load(Ordering::SeqCst), 3);
        assert_eq!(
            progress.finished.lock().unwrap().as_deref(),
            Some("Successfully scraped 1/3 sites")
        );
    }
}
