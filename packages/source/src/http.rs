//! Direct HTTP fetches that bypass the browser.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::SourceError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A fetched body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub url: String,
    pub body: String,
    pub content_type: Option<String>,
}

impl FetchedBody {
    /// Whether the server labelled or shaped the body as CSV.
    #[must_use]
    pub fn is_csv(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("csv"))
            || data_fetch_scraper::DataFormat::sniff(self.body.as_bytes())
                == data_fetch_scraper::DataFormat::Csv
    }
}

/// Builds the shared client.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the TLS backend cannot be initialised.
pub fn client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}

/// GETs `url` with `headers`, accepting JSON by default.
///
/// # Errors
///
/// Returns [`SourceError::Status`] for non-2xx answers and
/// [`SourceError::Http`] for transport failures.
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<FetchedBody, SourceError> {
    let mut request = client.get(url);
    if !headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
        request = request.header(reqwest::header::ACCEPT, "application/json");
    }
    for (key, value) in headers {
        request = request.header(key.as_str(), value.as_str());
    }

    log::debug!("GET {url}");
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.text().await?;
    log::debug!("Fetched {} bytes from {url}", body.len());

    Ok(FetchedBody {
        url: url.to_owned(),
        body,
        content_type,
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn sends_configured_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/series"))
            .and(header("x-api-key", "secret"))
            .and(header("accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("[1,2]"),
            )
            .mount(&server)
            .await;

        let mut headers = BTreeMap::new();
        headers.insert("x-api-key".to_owned(), "secret".to_owned());
        let client = client("DataFetchBot/1.0", DEFAULT_TIMEOUT).unwrap();
        let fetched = fetch_text(&client, &format!("{}/api/series", server.uri()), &headers)
            .await
            .unwrap();

        assert_eq!(fetched.body, "[1,2]");
        assert_eq!(fetched.content_type.as_deref(), Some("application/json"));
        assert!(!fetched.is_csv());
    }

    #[tokio::test]
    async fn non_success_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client("DataFetchBot/1.0", DEFAULT_TIMEOUT).unwrap();
        let err = fetch_text(&client, &server.uri(), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 429, .. }));
        assert_eq!(err.class(), crate::ErrorClass::RateLimit);
    }
}
