//! Extraction from any URL by discovering its data sources first.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use data_fetch_browser::{BrowserError, LoadOptions, PageLoadResult, PageLoader};
use data_fetch_discover::CandidateEndpoint;
use tokio::sync::Mutex;

use crate::http::{self, FetchedBody};
use crate::{Extractor, RawPayload, SourceError};

/// What a page load revealed about a URL.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub url: String,
    pub page: PageLoadResult,
    /// Sorted by descending confidence.
    pub candidates: Vec<CandidateEndpoint>,
}

impl Discovery {
    #[must_use]
    pub fn best(&self) -> Option<&CandidateEndpoint> {
        self.candidates.first()
    }
}

/// Scrapes unconfigured pages.
///
/// Discovery runs at most once per URL for the lifetime of the scraper.
/// Failed loads are not cached, and the cache lock is never held across a
/// page load.
pub struct UniversalScraper {
    site_id: String,
    loader: Arc<dyn PageLoader>,
    client: reqwest::Client,
    load_options: LoadOptions,
    discoveries: Mutex<BTreeMap<String, Arc<Discovery>>>,
}

impl UniversalScraper {
    #[must_use]
    pub fn new(loader: Arc<dyn PageLoader>, client: reqwest::Client) -> Self {
        Self {
            site_id: "universal".to_owned(),
            loader,
            client,
            load_options: LoadOptions::default(),
            discoveries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Id used for run ids and the raw archive directory.
    #[must_use]
    pub fn with_site_id(mut self, site_id: &str) -> Self {
        site_id.clone_into(&mut self.site_id);
        self
    }

    #[must_use]
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    /// Loads `url` and scores its network traffic, reusing an earlier
    /// discovery of the same URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Browser`] if the page cannot be loaded.
    pub async fn discover_sources(&self, url: &str) -> Result<Arc<Discovery>, SourceError> {
        if let Some(found) = self.discoveries.lock().await.get(url) {
            log::debug!("Reusing discovery for {url}");
            return Ok(Arc::clone(found));
        }

        log::info!("Discovering data sources for {url}");
        let page = self.loader.load(url, &self.load_options).await?;
        if let Some(error) = &page.error {
            return Err(BrowserError::Navigation(error.clone()).into());
        }

        let candidates = data_fetch_discover::score(&page.network_responses, Some(url));
        for candidate in candidates.iter().take(5) {
            log::debug!("  {:.2} {}", candidate.confidence, candidate.url);
        }

        let discovery = Arc::new(Discovery {
            url: url.to_owned(),
            page,
            candidates,
        });
        let mut cache = self.discoveries.lock().await;
        Ok(Arc::clone(cache.entry(url.to_owned()).or_insert(discovery)))
    }

    fn endpoint_payload(fetched: FetchedBody) -> RawPayload {
        if fetched.is_csv() {
            RawPayload::Csv {
                endpoint_url: fetched.url,
                body: fetched.body,
            }
        } else {
            RawPayload::Json {
                endpoint_url: fetched.url,
                body: fetched.body,
                content_type: fetched.content_type,
                data_path: None,
            }
        }
    }
}

#[async_trait]
impl Extractor for UniversalScraper {
    fn site_id(&self) -> &str {
        &self.site_id
    }

    async fn discover(&self, url: &str) -> Result<(), SourceError> {
        self.discover_sources(url).await.map(|_| ())
    }

    async fn fetch_raw(&self, url: &str) -> Result<RawPayload, SourceError> {
        let discovery = self.discover_sources(url).await?;

        if let Some(candidate) = discovery.best() {
            log::info!(
                "Using endpoint {} (confidence {:.2})",
                candidate.url,
                candidate.confidence
            );
            let fetched = match candidate.body_text() {
                Some(body) => FetchedBody {
                    url: candidate.url.clone(),
                    body,
                    content_type: Some(candidate.content_type.clone()),
                },
                None => {
                    log::info!("Body was not captured, fetching {} directly", candidate.url);
                    http::fetch_text(&self.client, &candidate.url, &BTreeMap::new()).await?
                }
            };
            return Ok(Self::endpoint_payload(fetched));
        }

        if !discovery.page.html.is_empty() {
            log::info!("No candidate endpoints, extracting from page HTML");
            return Ok(RawPayload::Html {
                url: discovery.url.clone(),
                html: discovery.page.html.clone(),
                selector: None,
            });
        }

        Err(SourceError::Empty("No data sources found".to_owned()))
    }
}
