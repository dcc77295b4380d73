//! Extraction for sites with a stored [`SiteConfig`].
//!
//! The configured strategy picks the payload directly, so no discovery pass
//! is needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use data_fetch_browser::{BrowserError, LoadOptions, PageLoadResult, PageLoader};
use data_fetch_scraper::Table;
use data_fetch_scraper::html_table::TableSelector;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Extractor, ExtractionStrategy, RawPayload, SiteConfig, SourceError, http};

/// Reads one configured site.
pub struct ConfiguredScraper {
    config: SiteConfig,
    loader: Arc<dyn PageLoader>,
    client: reqwest::Client,
    load_options: LoadOptions,
    last_request: Mutex<Option<Instant>>,
}

impl ConfiguredScraper {
    #[must_use]
    pub fn new(config: SiteConfig, loader: Arc<dyn PageLoader>, client: reqwest::Client) -> Self {
        Self {
            config,
            loader,
            client,
            load_options: LoadOptions::default(),
            last_request: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Sleeps until `rate_limit` seconds have passed since the last request.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let (Some(seconds), Some(previous)) = (self.config.rate_limit, *last) {
            let spacing = Duration::try_from_secs_f64(seconds).unwrap_or_default();
            let elapsed = previous.elapsed();
            if elapsed < spacing {
                log::debug!("Rate limiting {}: waiting {:?}", self.config.id, spacing - elapsed);
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_endpoint(&self) -> Result<RawPayload, SourceError> {
        let source = &self.config.data_source;
        let endpoint = source
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                SourceError::Config(format!("Site '{}' has no data_source.endpoint", self.config.id))
            })?;

        let fetched = http::fetch_text(&self.client, endpoint, &source.headers).await?;
        if fetched.is_csv() {
            return Ok(RawPayload::Csv {
                endpoint_url: fetched.url,
                body: fetched.body,
            });
        }
        Ok(RawPayload::Json {
            endpoint_url: fetched.url,
            body: fetched.body,
            content_type: fetched.content_type,
            data_path: source.data_path.clone(),
        })
    }

    async fn load_page(&self, url: &str, options: &LoadOptions) -> Result<PageLoadResult, SourceError> {
        let page = self.loader.load(url, options).await?;
        if let Some(error) = &page.error {
            return Err(BrowserError::Navigation(error.clone()).into());
        }
        Ok(page)
    }

    async fn fetch_table(&self, url: &str) -> Result<RawPayload, SourceError> {
        let selector = self.config.data_source.selector.clone();
        let mut options = self.load_options.clone();
        if let Some(css) = &selector {
            options = options.with_selector(css);
        }
        let page = self.load_page(url, &options).await?;
        Ok(RawPayload::Html {
            url: page.url,
            html: page.html,
            selector: selector.map(TableSelector::Css),
        })
    }

    async fn fetch_js_object(&self, url: &str) -> Result<RawPayload, SourceError> {
        let variable = self.config.data_source.variable_name.clone();
        let mut options = self.load_options.clone();
        if let Some(name) = &variable {
            options = options.with_js_variable(name);
        }
        let page = self.load_page(url, &options).await?;
        Ok(RawPayload::JsObject {
            url: page.url,
            html: page.html,
            variable_name: variable,
        })
    }
}

#[async_trait]
impl Extractor for ConfiguredScraper {
    fn site_id(&self) -> &str {
        &self.config.id
    }

    fn default_url(&self) -> Option<&str> {
        Some(&self.config.page_url)
    }

    async fn fetch_raw(&self, url: &str) -> Result<RawPayload, SourceError> {
        self.pace().await;
        match self.config.extraction_strategy {
            ExtractionStrategy::ApiJson => self.fetch_endpoint().await,
            ExtractionStrategy::DomTable => self.fetch_table(url).await,
            ExtractionStrategy::JsObject => self.fetch_js_object(url).await,
            ExtractionStrategy::Hybrid => {
                if self.config.data_source.endpoint.is_some() {
                    match self.fetch_endpoint().await {
                        Ok(raw) => return Ok(raw),
                        Err(e) => log::warn!(
                            "Endpoint fetch failed for {}, falling back to page: {e}",
                            self.config.id
                        ),
                    }
                }
                self.fetch_table(url).await
            }
        }
    }

    fn parse_raw(&self, raw: &RawPayload) -> Result<Table, SourceError> {
        crate::parse_payload(raw, &self.config.field_mappings)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use data_fetch_browser::StaticPageLoader;
    use data_fetch_source_models::DataSource;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const PAGE: &str = r#"<html><body>
        <table class="prices"><thead><tr><th>Date</th><th>Close</th></tr></thead>
        <tbody><tr><td>2024-01-01</td><td>100</td></tr><tr><td>2024-01-02</td><td>200</td></tr></tbody>
        </table>
        <script>window.chartData = [{"date":"2024-01-01","v":1}];</script>
        </body></html>"#;

    fn client() -> reqwest::Client {
        http::client("DataFetchBot/1.0", http::DEFAULT_TIMEOUT).unwrap()
    }

    fn scraper(config: SiteConfig) -> ConfiguredScraper {
        let loader = StaticPageLoader::new().with_html("https://site.com/page", PAGE);
        ConfiguredScraper::new(config, Arc::new(loader), client())
    }

    #[tokio::test]
    async fn api_json_fetches_endpoint_with_headers_and_mappings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/volume"))
            .and(header("referer", "https://site.com"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(r#"{"data":{"rows":[{"t":"2024-01-01","vol":5}]}}"#),
            )
            .mount(&server)
            .await;

        let mut mappings = BTreeMap::new();
        mappings.insert("date".to_owned(), "t".to_owned());
        let config = SiteConfig::new(
            "site_volume",
            "https://site.com",
            "https://site.com/page",
            ExtractionStrategy::ApiJson,
            DataSource::api(&format!("{}/api/volume", server.uri()))
                .with_data_path("data.rows")
                .with_header("referer", "https://site.com"),
        )
        .with_field_mappings(mappings);

        let scraper = scraper(config);
        let raw = scraper.fetch_raw("https://site.com/page").await.unwrap();
        assert!(matches!(raw, RawPayload::Json { .. }));
        let table = scraper.parse_raw(&raw).unwrap();
        assert_eq!(table.columns(), ["date", "vol"]);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn csv_endpoint_becomes_csv_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/csv")
                    .set_body_string("date,close\n2024-01-01,1\n2024-01-02,2\n"),
            )
            .mount(&server)
            .await;
        let config = SiteConfig::new(
            "csv",
            "https://site.com",
            "https://site.com/page",
            ExtractionStrategy::ApiJson,
            DataSource::api(&server.uri()),
        );

        let scraper = scraper(config);
        let raw = scraper.fetch_raw("https://site.com/page").await.unwrap();
        assert!(matches!(raw, RawPayload::Csv { .. }));
        assert_eq!(scraper.parse_raw(&raw).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dom_table_uses_configured_selector() {
        let config = SiteConfig::new(
            "table",
            "https://site.com",
            "https://site.com/page",
            ExtractionStrategy::DomTable,
            DataSource::table("table.prices"),
        );
        let scraper = scraper(config);
        let raw = scraper.fetch_raw("https://site.com/page").await.unwrap();
        let RawPayload::Html { selector, .. } = &raw else {
            panic!("expected html payload");
        };
        assert_eq!(selector, &Some(TableSelector::Css("table.prices".to_owned())));
        assert_eq!(scraper.parse_raw(&raw).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn js_object_reads_page_variable() {
        let mut source = DataSource::default();
        source.kind = data_fetch_source_models::DataSourceKind::JsObject;
        source.variable_name = Some("chartData".to_owned());
        let config = SiteConfig::new(
            "js",
            "https://site.com",
            "https://site.com/page",
            ExtractionStrategy::JsObject,
            source,
        );
        let scraper = scraper(config);
        let raw = scraper.fetch_raw("https://site.com/page").await.unwrap();
        let table = scraper.parse_raw(&raw).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.has_column("v"));
    }

    #[tokio::test]
    async fn hybrid_falls_back_to_page_and_failed_loads_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let config = SiteConfig::new(
            "hybrid",
            "https://site.com",
            "https://site.com/page",
            ExtractionStrategy::Hybrid,
            DataSource::api(&server.uri()),
        );
        let scraper = scraper(config);
        let raw = scraper.fetch_raw("https://site.com/page").await.unwrap();
        assert!(matches!(raw, RawPayload::Html { selector: None, .. }));
        // two rows is under the best-table minimum, so page JS data is used
        let table = scraper.parse_raw(&raw).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.has_column("v"));

        let err = scraper.fetch_raw("https://elsewhere.com").await.unwrap_err();
        assert!(matches!(err, SourceError::Browser(BrowserError::Navigation(_))));
    }

    #[tokio::test]
    async fn rate_limit_spaces_requests() {
        let config = SiteConfig::new(
            "paced",
            "https://site.com",
            "https://site.com/page",
            ExtractionStrategy::DomTable,
            DataSource::default(),
        )
        .with_rate_limit(0.2);
        let scraper = scraper(config);

        let start = std::time::Instant::now();
        scraper.fetch_raw("https://site.com/page").await.unwrap();
        scraper.fetch_raw("https://site.com/page").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
