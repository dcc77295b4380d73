//! Headless Chromium page loader built on `chromiumoxide`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, RequestId,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;

use crate::stealth::{self, StealthProfile};
use crate::waits;
use crate::{BrowserError, LoadOptions, NetworkResponse, PageLoadResult, PageLoader};

/// Environment variable naming an explicit Chrome/Chromium binary.
pub const CHROME_ENV: &str = "DATA_FETCH_CHROME";

/// Quiet period after which the network counts as idle.
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);

/// Upper bound on the network-idle wait.
const NETWORK_IDLE_MAX: Duration = Duration::from_secs(5);

/// Locates a Chrome/Chromium executable.
///
/// Checks [`CHROME_ENV`] first, then the usual binary names on `PATH`.
#[must_use]
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROME_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        log::warn!("{CHROME_ENV}={p} does not exist, searching PATH");
    }

    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

struct Captured {
    request_id: RequestId,
    response: NetworkResponse,
}

type CaptureLog = Arc<Mutex<Vec<Captured>>>;

/// Page loader driving a lazily launched headless Chromium.
///
/// Each [`PageLoader::load`] call opens a fresh page and closes it when
/// done; the browser process is shared across calls.
pub struct ChromiumLoader {
    executable: Option<PathBuf>,
    headless: bool,
    browser: OnceCell<Browser>,
}

impl Default for ChromiumLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromiumLoader {
    /// Creates a loader. The browser starts on first use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            executable: None,
            headless: true,
            browser: OnceCell::new(),
        }
    }

    /// Uses a specific browser binary instead of searching for one.
    #[must_use]
    pub fn with_executable(mut self, path: PathBuf) -> Self {
        self.executable = Some(path);
        self
    }

    /// Shows the browser window.
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    async fn browser(&self) -> Result<&Browser, BrowserError> {
        self.browser
            .get_or_try_init(|| async {
                let chrome_path = self
                    .executable
                    .clone()
                    .or_else(find_chromium)
                    .ok_or_else(|| {
                        BrowserError::Launch(format!(
                            "Chromium not found; install Chrome or set {CHROME_ENV}"
                        ))
                    })?;

                let mut builder = BrowserConfig::builder()
                    .chrome_executable(chrome_path)
                    .arg("--disable-gpu")
                    .arg("--no-sandbox")
                    .arg("--disable-dev-shm-usage")
                    .arg("--disable-blink-features=AutomationControlled");
                if self.headless {
                    builder = builder.arg("--headless=new");
                } else {
                    builder = builder.with_head();
                }
                let config = builder.build().map_err(BrowserError::Launch)?;

                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?;

                tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if let Err(e) = event {
                            log::debug!("Browser handler error: {e}");
                        }
                    }
                });

                log::info!("Browser started");
                Ok(browser)
            })
            .await
    }
}

#[async_trait]
impl PageLoader for ChromiumLoader {
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<PageLoadResult, BrowserError> {
        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Cdp(e.to_string()))?;

        let result = load_on_page(&page, url, options).await;

        if let Err(e) = page.close().await {
            log::debug!("Failed to close page: {e}");
        }
        result
    }
}

async fn load_on_page(
    page: &Page,
    url: &str,
    options: &LoadOptions,
) -> Result<PageLoadResult, BrowserError> {
    if options.use_stealth {
        apply_stealth(page, &StealthProfile::random()).await?;
    }

    let captured: CaptureLog = Arc::new(Mutex::new(Vec::new()));
    let listeners = if options.capture_network {
        Some(spawn_capture(page, Arc::clone(&captured)).await?)
    } else {
        None
    };

    let start = Instant::now();
    if options.use_stealth {
        tokio::time::sleep(stealth::random_delay()).await;
    }

    let navigation = tokio::time::timeout(
        Duration::from_millis(options.navigation_timeout_ms),
        page.goto(url),
    )
    .await;

    let error = match navigation {
        Ok(Ok(_)) => {
            wait_for_page(page, options, &captured).await;
            None
        }
        Ok(Err(e)) => Some(format!("Navigation failed for {url}: {e}")),
        Err(_) => Some(format!(
            "Navigation timed out after {}ms for {url}",
            options.navigation_timeout_ms
        )),
    };
    let load_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let Some((requests, responses)) = listeners {
        requests.abort();
        responses.abort();
    }

    let mut entries = std::mem::take(&mut *captured.lock().await);
    if options.capture_response_bodies {
        for entry in &mut entries {
            if entry.response.is_data_response() {
                capture_body(page, entry).await;
            }
        }
    }
    let network_responses: Vec<NetworkResponse> =
        entries.into_iter().map(|e| e.response).collect();

    if let Some(error) = error {
        log::error!("Error loading page: {error}");
        return Ok(PageLoadResult {
            network_responses,
            ..PageLoadResult::failed(url, error, load_time_ms)
        });
    }

    let html = page
        .content()
        .await
        .map_err(|e| BrowserError::Cdp(e.to_string()))?;
    let title = page.get_title().await.ok().flatten().unwrap_or_default();

    log::info!(
        "Loaded {url} in {load_time_ms}ms, captured {} network responses",
        network_responses.len()
    );

    Ok(PageLoadResult {
        url: url.to_owned(),
        html,
        title,
        network_responses,
        error: None,
        load_time_ms,
    })
}

async fn apply_stealth(page: &Page, profile: &StealthProfile) -> Result<(), BrowserError> {
    let cdp = |e: chromiumoxide::error::CdpError| BrowserError::Cdp(e.to_string());

    let ua = SetUserAgentOverrideParams::builder()
        .user_agent(profile.user_agent.clone())
        .accept_language(profile.accept_language())
        .build()
        .map_err(BrowserError::Cdp)?;
    page.execute(ua).await.map_err(cdp)?;

    let (width, height) = profile.viewport;
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(width),
        i64::from(height),
        1.0,
        false,
    ))
    .await
    .map_err(cdp)?;

    if let Err(e) = page
        .execute(SetTimezoneOverrideParams::new(profile.timezone.clone()))
        .await
    {
        log::debug!("Timezone override rejected: {e}");
    }

    for script in profile.scripts() {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(cdp)?;
    }

    log::debug!(
        "Stealth profile applied ({}x{}, {})",
        width,
        height,
        profile.timezone
    );
    Ok(())
}

async fn spawn_capture(
    page: &Page,
    captured: CaptureLog,
) -> Result<(JoinHandle<()>, JoinHandle<()>), BrowserError> {
    let cdp = |e: chromiumoxide::error::CdpError| BrowserError::Cdp(e.to_string());

    let methods: Arc<Mutex<BTreeMap<String, String>>> = Arc::new(Mutex::new(BTreeMap::new()));

    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(cdp)?;
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(cdp)?;

    let request_methods = Arc::clone(&methods);
    let request_task = tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            request_methods
                .lock()
                .await
                .insert(event.request_id.inner().clone(), event.request.method.clone());
        }
    });

    let response_task = tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            let headers: BTreeMap<String, String> = event
                .response
                .headers
                .inner()
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| {
                            (
                                k.to_ascii_lowercase(),
                                v.as_str().map_or_else(|| v.to_string(), str::to_owned),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();

            let content_length = headers
                .get("content-length")
                .and_then(|v| v.parse::<u64>().ok())
                .or_else(|| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let encoded = event.response.encoded_data_length.max(0.0) as u64;
                    (encoded > 0).then_some(encoded)
                });

            let method = methods
                .lock()
                .await
                .get(event.request_id.inner())
                .cloned()
                .unwrap_or_else(|| "GET".to_owned());

            let response = NetworkResponse {
                url: event.response.url.clone(),
                method,
                resource_type: format!("{:?}", event.r#type).to_ascii_lowercase(),
                status: u16::try_from(event.response.status).ok(),
                content_type: headers
                    .get("content-type")
                    .cloned()
                    .or_else(|| Some(event.response.mime_type.clone())),
                content_length,
                body: None,
                headers,
            };

            captured.lock().await.push(Captured {
                request_id: event.request_id.clone(),
                response,
            });
        }
    });

    Ok((request_task, response_task))
}

async fn capture_body(page: &Page, entry: &mut Captured) {
    match page
        .execute(GetResponseBodyParams::new(entry.request_id.clone()))
        .await
    {
        Ok(body) => {
            let bytes = if body.result.base64_encoded {
                match base64::engine::general_purpose::STANDARD.decode(&body.result.body) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::debug!("Undecodable body for {}: {e}", entry.response.url);
                        return;
                    }
                }
            } else {
                body.result.body.clone().into_bytes()
            };
            entry.response.body = Some(bytes);
        }
        Err(e) => log::debug!("Could not read body of {}: {e}", entry.response.url),
    }
}

async fn wait_for_page(page: &Page, options: &LoadOptions, captured: &CaptureLog) {
    let optional_timeout = Duration::from_millis(options.wait_for_timeout_ms);

    if let Some(variable) = &options.wait_for_js_variable {
        let script = waits::js_variable_defined(variable);
        if poll_until(page, &script, optional_timeout).await {
            log::debug!("Detected JavaScript variable: {variable}");
        } else {
            log::warn!("JavaScript variable '{variable}' not found within timeout");
        }
    }

    if let Some(selector) = &options.wait_for_selector {
        match tokio::time::timeout(optional_timeout, page.find_element(selector.as_str())).await {
            Ok(Ok(_)) => log::debug!("Selector found: {selector}"),
            Ok(Err(_)) | Err(_) => {
                log::warn!("Selector '{selector}' not found within timeout");
            }
        }
    }

    if options.wait_for_network_idle {
        wait_for_network_idle(captured).await;
    }

    tokio::time::sleep(optional_timeout).await;

    if options.wait_for_data_loaded {
        log::debug!("Waiting for data to load...");
        if poll_until(page, &waits::data_loaded_check(), optional_timeout).await {
            log::debug!("Data loading detected");
        } else {
            log::debug!("Data loading timeout, proceeding anyway");
        }
    }
}

async fn wait_for_network_idle(captured: &CaptureLog) {
    let deadline = Instant::now() + NETWORK_IDLE_MAX;
    let mut last_seen = captured.lock().await.len();
    while Instant::now() < deadline {
        tokio::time::sleep(NETWORK_IDLE_QUIET).await;
        let seen = captured.lock().await.len();
        if seen == last_seen {
            return;
        }
        last_seen = seen;
    }
}

/// Evaluates `expression` every [`waits::POLL_INTERVAL`] until it returns
/// `true` or `timeout` elapses.
async fn poll_until(page: &Page, expression: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(result) = page.evaluate(expression).await
            && result.into_value::<bool>().unwrap_or(false)
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(waits::POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a local Chromium"]
    async fn loads_a_data_url() {
        let loader = ChromiumLoader::new();
        let result = loader
            .load(
                "data:text/html,<title>t</title><table><tr><td>1</td></tr></table>",
                &LoadOptions::default().with_wait_timeout_ms(100),
            )
            .await
            .unwrap();
        assert!(result.is_ok());
        assert!(result.html.contains("<table>"));
    }
}
