//! Public market-data APIs tried in order when a primary site fails.
//!
//! [`FallbackScraper`] reads CoinGecko, CoinDesk or the legacy
//! CryptoCompare API. [`FallbackChain`] runs the primary extractor and then
//! each fallback through [`run_scrape`] until one succeeds, recording every
//! failed source in the result metadata.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use data_fetch_compliance::RobotsChecker;
use data_fetch_scraper::dates::{from_epoch, parse_date_str};
use data_fetch_scraper::{Cell, ScrapeError, Table};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Extractor, RawPayload, ScrapeOptions, ScraperResult, SiteConfig, SourceError, http, run_scrape};

/// Fallbacks used by `scrape --site` unless disabled.
pub const DEFAULT_FALLBACK_SITES: &[&str] =
    &["coingecko_btc_market_chart", "cryptocompare_exchange_volume"];

const COINGECKO_FREE: &str = "https://api.coingecko.com/api/v3";
const COINGECKO_PRO: &str = "https://pro-api.coingecko.com/api/v3";
const COINDESK_BASE: &str = "https://api.coindesk.com/v1";
const CRYPTOCOMPARE_BASE: &str = "https://min-api.cryptocompare.com/data";

const COINGECKO_FREE_INTERVAL: Duration = Duration::from_secs(1);
const COINGECKO_PRO_INTERVAL: Duration = Duration::from_millis(500);

/// Which public API a fallback reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackApi {
    CoinGecko,
    CoinDesk,
    CryptoCompare,
}

impl FallbackApi {
    /// Picks the API from a site id prefix.
    #[must_use]
    pub fn for_site(site_id: &str) -> Option<Self> {
        if site_id.starts_with("coingecko") {
            Some(Self::CoinGecko)
        } else if site_id.starts_with("coindesk") {
            Some(Self::CoinDesk)
        } else if site_id.starts_with("cryptocompare") {
            Some(Self::CryptoCompare)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CoinGecko => "CoinGecko",
            Self::CoinDesk => "CoinDesk",
            Self::CryptoCompare => "CryptoCompare",
        }
    }

    fn default_endpoint(self, site_id: &str, pro: bool) -> String {
        match self {
            Self::CoinGecko => {
                let base = if pro { COINGECKO_PRO } else { COINGECKO_FREE };
                if site_id.contains("exchange") {
                    format!("{base}/exchanges")
                } else {
                    format!("{base}/coins/bitcoin/market_chart?vs_currency=usd&days=30")
                }
            }
            Self::CoinDesk => format!(
                "{COINDESK_BASE}/bpi/historical/close.json?currency=USD&start=2024-01-01&end=2024-01-31"
            ),
            Self::CryptoCompare => {
                format!("{CRYPTOCOMPARE_BASE}/v2/histoday?fsym=BTC&tsym=USD&limit=30")
            }
        }
    }

    /// Environment variables holding a key, in lookup order.
    const fn key_vars(self) -> &'static [&'static str] {
        match self {
            Self::CoinGecko => &["COINGECKO_API_KEY"],
            Self::CoinDesk => &["COINDESK_API_KEY", "CRYPTOCOMPARE_API_KEY"],
            Self::CryptoCompare => &["CRYPTOCOMPARE_API_KEY", "COINDESK_API_KEY"],
        }
    }
}

/// Whether a CoinGecko key belongs to the Pro tier. Demo keys start with
/// `CG-`.
#[must_use]
pub fn is_coingecko_pro_key(key: &str) -> bool {
    !key.starts_with("CG-") && (key.len() > 50 || key.to_ascii_lowercase().contains("pro"))
}

/// Reads one public market-data API.
pub struct FallbackScraper {
    site_id: String,
    api: FallbackApi,
    endpoint: Option<String>,
    api_key: Option<String>,
    pro: bool,
    client: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
}

impl FallbackScraper {
    #[must_use]
    pub fn new(site_id: &str, api: FallbackApi, client: reqwest::Client) -> Self {
        Self {
            site_id: site_id.to_owned(),
            api,
            endpoint: None,
            api_key: None,
            pro: false,
            client,
            last_request: Mutex::new(None),
        }
    }

    /// Builds the fallback for `site_id`, taking the endpoint from a stored
    /// config when there is one and the API key from the environment.
    /// Returns `None` for ids that match no known API.
    #[must_use]
    pub fn from_env(site_id: &str, config: Option<&SiteConfig>, client: reqwest::Client) -> Option<Self> {
        let api = FallbackApi::for_site(site_id)?;
        let mut scraper = Self::new(site_id, api, client);
        if let Some(endpoint) = config.and_then(|c| c.data_source.endpoint.as_deref()) {
            scraper = scraper.with_endpoint(endpoint);
        }
        if let Some(key) = api.key_vars().iter().find_map(|var| std::env::var(var).ok()) {
            scraper = scraper.with_api_key(&key);
        }
        if api == FallbackApi::CoinGecko
            && std::env::var("COINGECKO_USE_PRO")
                .is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        {
            scraper.pro = true;
        }
        Some(scraper)
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_owned());
        self
    }

    /// Sets the API key. For CoinGecko this also picks the Pro or Demo
    /// tier from the key's shape.
    #[must_use]
    pub fn with_api_key(mut self, key: &str) -> Self {
        if self.api == FallbackApi::CoinGecko {
            self.pro = is_coingecko_pro_key(key);
        }
        self.api_key = Some(key.to_owned());
        self
    }

    #[must_use]
    pub const fn api(&self) -> FallbackApi {
        self.api
    }

    fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| self.api.default_endpoint(&self.site_id, self.pro))
    }

    /// The URL actually requested, with CoinGecko defaults, tier host and
    /// key parameter applied.
    #[must_use]
    pub fn request_url(&self) -> String {
        let mut endpoint = self.endpoint();
        if self.api != FallbackApi::CoinGecko {
            return endpoint;
        }

        if endpoint.contains("market_chart") && !endpoint.contains("vs_currency") {
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            endpoint = format!("{endpoint}{separator}vs_currency=usd&days=30");
        }
        let (from, to) = if self.pro {
            (COINGECKO_FREE, COINGECKO_PRO)
        } else {
            (COINGECKO_PRO, COINGECKO_FREE)
        };
        if let Some(rest) = endpoint.strip_prefix(from) {
            endpoint = format!("{to}{rest}");
        }

        match (&self.api_key, url::Url::parse(&endpoint)) {
            (Some(key), Ok(mut parsed)) => {
                let param = if self.pro { "x_cg_pro_api_key" } else { "x_cg_demo_api_key" };
                parsed.query_pairs_mut().append_pair(param, key);
                parsed.to_string()
            }
            _ => endpoint,
        }
    }

    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        let Some(key) = &self.api_key else {
            return headers;
        };
        let (name, value) = match (self.api, self.pro) {
            (FallbackApi::CoinGecko, true) => ("x-cg-pro-api-key", key.clone()),
            (FallbackApi::CoinGecko, false) => ("x-cg-demo-api-key", key.clone()),
            (FallbackApi::CoinDesk, _) => ("Authorization", format!("Bearer {key}")),
            (FallbackApi::CryptoCompare, _) => ("authorization", format!("Apikey {key}")),
        };
        headers.insert(name.to_owned(), value);
        headers
    }

    async fn pace(&self) {
        if self.api != FallbackApi::CoinGecko {
            return;
        }
        let spacing = if self.pro {
            COINGECKO_PRO_INTERVAL
        } else {
            COINGECKO_FREE_INTERVAL
        };
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Extractor for FallbackScraper {
    fn site_id(&self) -> &str {
        &self.site_id
    }

    /// The API host, checked against its robots.txt.
    fn default_url(&self) -> Option<&str> {
        let base = match self.api {
            FallbackApi::CoinGecko if self.pro => COINGECKO_PRO,
            FallbackApi::CoinGecko => COINGECKO_FREE,
            FallbackApi::CoinDesk => COINDESK_BASE,
            FallbackApi::CryptoCompare => CRYPTOCOMPARE_BASE,
        };
        Some(self.endpoint.as_deref().unwrap_or(base))
    }

    async fn fetch_raw(&self, _url: &str) -> Result<RawPayload, SourceError> {
        self.pace().await;
        let url = self.request_url();
        let endpoint_url = url.split('?').next().unwrap_or(&url).to_owned();
        log::info!("Fetching from {}: {endpoint_url}", self.api.name());

        let fetched = http::fetch_text(&self.client, &url, &self.headers()).await?;
        Ok(RawPayload::Json {
            endpoint_url,
            body: fetched.body,
            content_type: fetched.content_type,
            data_path: None,
        })
    }

    fn parse_raw(&self, raw: &RawPayload) -> Result<Table, SourceError> {
        let body: Value = serde_json::from_str(raw.content()).map_err(ScrapeError::from)?;
        let table = match self.api {
            FallbackApi::CoinGecko => parse_coingecko(&body),
            FallbackApi::CoinDesk => parse_coindesk(&body),
            FallbackApi::CryptoCompare => parse_cryptocompare(&body),
        };
        log::info!("Parsed {} rows from {}", table.len(), self.api.name());
        Ok(table)
    }
}

fn pair(entry: &Value) -> Option<(f64, Option<f64>)> {
    let items = entry.as_array()?;
    Some((items.first()?.as_f64()?, items.get(1).and_then(Value::as_f64)))
}

fn number(value: Option<f64>) -> Cell {
    value.map_or(Cell::Null, Cell::Number)
}

fn object_rows(items: &[Value]) -> Vec<Map<String, Value>> {
    items.iter().filter_map(Value::as_object).cloned().collect()
}

/// Market chart (`prices`/`total_volumes`/`market_caps` pairs), simple
/// price maps keyed by coin, or exchange lists.
#[must_use]
pub fn parse_coingecko(body: &Value) -> Table {
    match body {
        Value::Object(map) if map.contains_key("prices") => {
            let series = |key: &str| -> Vec<(f64, Option<f64>)> {
                map.get(key)
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(pair).collect())
                    .unwrap_or_default()
            };
            let prices = series("prices");
            let volumes = series("total_volumes");
            let caps = series("market_caps");

            let mut rows: Vec<(f64, Vec<Cell>)> = prices
                .iter()
                .enumerate()
                .map(|(i, (ts, price))| {
                    let stamp = from_epoch(*ts).map_or(Cell::Null, Cell::Timestamp);
                    let volume = volumes.get(i).and_then(|v| v.1);
                    let cap = caps.get(i).and_then(|v| v.1);
                    (*ts, vec![stamp, number(*price), number(volume), number(cap)])
                })
                .collect();
            rows.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut table = Table::new(
                ["date", "price", "volume", "market_cap"]
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
            );
            for (_, row) in rows {
                table.push_row(row);
            }
            table
        }
        Value::Object(map) if !map.contains_key("total_volumes") && !map.contains_key("market_caps") => {
            let records: Vec<Map<String, Value>> = map
                .iter()
                .map(|(coin, prices)| {
                    let mut record = Map::new();
                    record.insert("coin_id".to_owned(), Value::String(coin.clone()));
                    if let Some(prices) = prices.as_object() {
                        record.extend(prices.clone());
                    }
                    record
                })
                .collect();
            let mut table = Table::from_records(&records, true);
            let now = Utc::now().naive_utc();
            table.add_column("date", |_| Cell::Timestamp(now));
            table
        }
        Value::Array(items) => Table::from_records(&object_rows(items), true),
        Value::Object(map) => Table::from_records(&[map.clone()], true),
        _ => Table::default(),
    }
}

/// CoinDesk `bpi` maps of date to closing price.
#[must_use]
pub fn parse_coindesk(body: &Value) -> Table {
    let Some(bpi) = body.get("bpi").and_then(Value::as_object) else {
        return body
            .as_object()
            .map(|map| Table::from_records(&[map.clone()], true))
            .unwrap_or_default();
    };

    let mut rows: Vec<(Cell, Cell)> = bpi
        .iter()
        .map(|(date, price)| {
            let stamp = parse_date_str(date).map_or(Cell::Null, Cell::Timestamp);
            (stamp, number(price.as_f64()))
        })
        .collect();
    rows.sort_by(|a, b| a.0.as_timestamp().cmp(&b.0.as_timestamp()));

    let mut table = Table::new(vec!["date".to_owned(), "price".to_owned()]);
    for (date, price) in rows {
        table.push_row(vec![date, price]);
    }
    table
}

/// CryptoCompare `histoday` rows under `Data` or `Data.Data`, with `time`
/// converted to a `date` column and OHLCV names normalized.
#[must_use]
pub fn parse_cryptocompare(body: &Value) -> Table {
    let mut data = body;
    for _ in 0..2 {
        if let Some(inner) = data.get("Data") {
            data = inner;
        }
    }
    let mut records = match data {
        Value::Array(items) => object_rows(items),
        Value::Object(map) => vec![map.clone()],
        _ => Vec::new(),
    };
    records.sort_by(|a, b| {
        let time = |r: &Map<String, Value>| r.get("time").and_then(Value::as_f64).unwrap_or(0.0);
        time(a).total_cmp(&time(b))
    });

    let mut table = Table::from_records(&records, true);
    if let Some(time) = table.column_index("time") {
        table.add_column("date", |row| {
            row[time]
                .as_f64()
                .and_then(from_epoch)
                .map_or(Cell::Null, Cell::Timestamp)
        });
    }
    for (from, to) in [("volumeto", "volume"), ("volumefrom", "volume_from"), ("close", "price")] {
        table.rename_column(from, to);
    }
    table
}

/// Primary extractor followed by fallbacks, tried in order.
pub struct FallbackChain {
    fallbacks: Vec<Box<dyn Extractor>>,
}

impl FallbackChain {
    #[must_use]
    pub const fn new(fallbacks: Vec<Box<dyn Extractor>>) -> Self {
        Self { fallbacks }
    }

    /// Builds fallbacks for `site_ids`, using a stored config of the same
    /// id when present. Ids that match no known API are skipped.
    #[must_use]
    pub fn from_site_ids(site_ids: &[&str], sites: &[SiteConfig], client: &reqwest::Client) -> Self {
        let fallbacks = site_ids
            .iter()
            .filter_map(|id| {
                let config = sites.iter().find(|s| s.id == *id);
                let scraper = FallbackScraper::from_env(id, config, client.clone());
                if scraper.is_none() {
                    log::warn!("No fallback scraper for '{id}'");
                }
                scraper.map(|s| Box::new(s) as Box<dyn Extractor>)
            })
            .collect();
        Self::new(fallbacks)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fallbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fallbacks.is_empty()
    }

    /// Scrapes with `primary`, then with each fallback until one succeeds.
    ///
    /// A fallback success carries `fallback_sources_tried` in its metadata.
    /// When everything fails, the primary result is returned with an
    /// `All sources failed` error and `sources_tried` metadata.
    pub async fn scrape(
        &self,
        primary: &dyn Extractor,
        url: Option<&str>,
        robots: &RobotsChecker,
        options: &ScrapeOptions,
    ) -> ScraperResult {
        let mut result = run_scrape(primary, url, robots, options).await;
        if result.success {
            return result;
        }

        let mut tried = vec![(
            primary.site_id().to_owned(),
            result.error.clone().unwrap_or_default(),
        )];
        for fallback in &self.fallbacks {
            log::info!("Trying fallback: {}", fallback.site_id());
            let mut attempt = run_scrape(fallback.as_ref(), None, robots, options).await;
            if attempt.success {
                attempt
                    .metadata
                    .insert("fallback_sources_tried".to_owned(), tried_json(&tried));
                return attempt;
            }
            log::warn!(
                "Fallback {} failed: {}",
                fallback.site_id(),
                attempt.error.as_deref().unwrap_or("unknown error")
            );
            tried.push((
                fallback.site_id().to_owned(),
                attempt.error.unwrap_or_default(),
            ));
        }

        if self.fallbacks.is_empty() {
            return result;
        }
        let summary: Vec<String> = tried.iter().map(|(id, e)| format!("{id}: {e}")).collect();
        result.error = Some(format!("All sources failed: {}", summary.join("; ")));
        result.metadata.insert("sources_tried".to_owned(), tried_json(&tried));
        result
    }
}

fn tried_json(tried: &[(String, String)]) -> Value {
    Value::Array(
        tried
            .iter()
            .map(|(source, error)| serde_json::json!({ "source": source, "error": error }))
            .collect(),
    )
}
