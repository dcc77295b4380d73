#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Candidate endpoint scoring.
//!
//! Ranks the network responses captured during a page load by how likely
//! each one is to carry the page's data. The score is an additive keyword
//! and shape heuristic, rescaled into `[0, 1]`. Every weight lives in a
//! named constant below.

pub mod structure;

use std::sync::LazyLock;

use data_fetch_browser_models::NetworkResponse;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
pub use structure::{DetectedStructure, JsonShape, analyze_json};
use url::Url;

// ── Scoring policy ─────────────────────────────────────────────────

/// URL fragments that suggest a data endpoint.
pub const DATA_KEYWORDS: &[&str] = &[
    "api", "chart", "data", "series", "history", "export", "json", "csv", "stats", "metrics",
    "prices", "volume", "market", "ticker", "quote", "ohlc", "candle",
];

/// URL fragments that suggest tracking, ads or consent traffic.
pub const TRACKING_KEYWORDS: &[&str] = &[
    "analytics",
    "tracking",
    "pixel",
    "beacon",
    "collect",
    "facebook",
    "google-analytics",
    "clarity",
    "hotjar",
    "segment",
    "amplitude",
    "mixpanel",
    "gtm",
    "recaptcha",
    "cookie",
    "consent",
    "ads",
    "advertising",
];

/// Added per data keyword found in the URL.
pub const DATA_KEYWORD_WEIGHT: f64 = 2.0;
/// Subtracted per tracking keyword found in the URL.
pub const TRACKING_KEYWORD_PENALTY: f64 = 2.0;
/// JSON content type bonus.
pub const JSON_BONUS: f64 = 1.0;
/// CSV content type bonus.
pub const CSV_BONUS: f64 = 1.5;
/// Response host equals the page host.
pub const SAME_HOST_BONUS: f64 = 0.5;
/// Content length thresholds, each adding [`SIZE_BONUS`].
pub const SIZE_THRESHOLDS: [u64; 2] = [1000, 10_000];
/// Bonus per size threshold exceeded.
pub const SIZE_BONUS: f64 = 0.5;
/// Body looks like a time series.
pub const TIMESERIES_BONUS: f64 = 3.0;
/// Raw score that maps to a confidence of 1.0.
pub const SCORE_SCALE: f64 = 10.0;
/// Candidates below this confidence are discarded.
pub const MIN_SCORE: f64 = 0.2;
/// Default threshold for [`best`].
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
/// Characters of body kept in [`CandidateEndpoint::data_preview`].
pub const PREVIEW_LEN: usize = 500;

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}",
        r"\d{10,13}",
        r#""date""#,
        r#""time""#,
        r#""timestamp""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static OBJECT_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\{[^}]+\}\s*,\s*\{[^}]+\}").expect("valid regex"));

// ── Candidates ─────────────────────────────────────────────────────

/// A scored guess that a captured response is the page's data payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    pub url: String,
    pub method: String,
    pub content_type: String,
    /// Rescaled score in `[0, 1]`.
    pub confidence: f64,
    /// First [`PREVIEW_LEN`] characters of the body.
    pub data_preview: Option<String>,
    pub detected_structure: Option<DetectedStructure>,
    pub field_names: Vec<String>,
    pub row_count_estimate: Option<usize>,
    /// Captured body, if the browser kept it.
    pub body: Option<Vec<u8>>,
}

impl CandidateEndpoint {
    /// Body as UTF-8 text.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Whether the content type names CSV.
    #[must_use]
    pub fn is_csv(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("csv")
    }
}

/// `true` when `body` has a date-like token and an array of at least two
/// objects.
#[must_use]
pub fn looks_like_timeseries(body: &str) -> bool {
    DATE_PATTERNS.iter().any(|p| p.is_match(body)) && OBJECT_ARRAY.is_match(body)
}

fn host_key(url: &str) -> Option<(String, Option<u16>)> {
    let parsed = Url::parse(url).ok()?;
    Some((parsed.host_str()?.to_owned(), parsed.port()))
}

/// Raw additive score before rescaling.
#[must_use]
pub fn raw_score(response: &NetworkResponse, target_host: Option<&(String, Option<u16>)>) -> f64 {
    let url = response.url.to_ascii_lowercase();
    let mut score = 0.0;

    for keyword in DATA_KEYWORDS {
        if url.contains(keyword) {
            score += DATA_KEYWORD_WEIGHT;
        }
    }
    for keyword in TRACKING_KEYWORDS {
        if url.contains(keyword) {
            score -= TRACKING_KEYWORD_PENALTY;
        }
    }

    if response.is_json() {
        score += JSON_BONUS;
    } else if response.is_csv() {
        score += CSV_BONUS;
    }

    if let Some(target) = target_host
        && host_key(&response.url).as_ref() == Some(target)
    {
        score += SAME_HOST_BONUS;
    }

    if let Some(length) = response.content_length {
        for threshold in SIZE_THRESHOLDS {
            if length > threshold {
                score += SIZE_BONUS;
            }
        }
    }

    if let Some(body) = response.body_text()
        && looks_like_timeseries(&body)
    {
        score += TIMESERIES_BONUS;
    }

    score
}

/// Rescales a raw score into `[0, 1]`.
#[must_use]
pub fn rescale(raw: f64) -> f64 {
    (raw / SCORE_SCALE).clamp(0.0, 1.0)
}

/// Scores every eligible response and returns candidates sorted by
/// descending confidence.
///
/// Only status-200 JSON or CSV responses are considered; anything scoring
/// under [`MIN_SCORE`] is dropped. Ties keep arrival order.
#[must_use]
pub fn score(responses: &[NetworkResponse], target_url: Option<&str>) -> Vec<CandidateEndpoint> {
    let target_host = target_url.and_then(host_key);

    let mut candidates: Vec<CandidateEndpoint> = responses
        .iter()
        .filter(|r| r.status == Some(200) && (r.is_json() || r.is_csv()))
        .filter_map(|r| {
            let confidence = rescale(raw_score(r, target_host.as_ref()));
            if confidence < MIN_SCORE {
                return None;
            }
            Some(build_candidate(r, confidence))
        })
        .collect();

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    log::info!("Found {} candidate endpoints", candidates.len());
    candidates
}

fn build_candidate(response: &NetworkResponse, confidence: f64) -> CandidateEndpoint {
    let mut candidate = CandidateEndpoint {
        url: response.url.clone(),
        method: response.method.clone(),
        content_type: response.content_type.clone().unwrap_or_default(),
        confidence,
        data_preview: None,
        detected_structure: None,
        field_names: Vec::new(),
        row_count_estimate: None,
        body: response.body.clone(),
    };

    if let Some(text) = response.body_text().filter(|t| !t.is_empty()) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text)
            && let Some(shape) = analyze_json(&value)
        {
            candidate.detected_structure = Some(shape.structure);
            candidate.field_names = shape.field_names;
            candidate.row_count_estimate = shape.row_count_estimate;
        }

        let mut preview: String = text.chars().take(PREVIEW_LEN).collect();
        if text.chars().count() > PREVIEW_LEN {
            preview.push_str("...");
        }
        candidate.data_preview = Some(preview);
    }

    candidate
}

/// Highest-scoring candidate at or above `min_confidence`.
#[must_use]
pub fn best(
    responses: &[NetworkResponse],
    target_url: Option<&str>,
    min_confidence: f64,
) -> Option<CandidateEndpoint> {
    score(responses, target_url)
        .into_iter()
        .find(|c| c.confidence >= min_confidence)
}

/// Keeps candidates whose URL matches `pattern` (case-insensitive).
///
/// # Errors
///
/// Returns the regex error if `pattern` is invalid.
pub fn filter_by_pattern(
    candidates: &[CandidateEndpoint],
    pattern: &str,
) -> Result<Vec<CandidateEndpoint>, regex::Error> {
    let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
    Ok(candidates
        .iter()
        .filter(|c| re.is_match(&c.url))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_response(url: &str, body: &str) -> NetworkResponse {
        NetworkResponse::new(url, 200)
            .with_content_type("application/json")
            .with_body(body)
    }

    const SERIES: &str = r#"[{"date":"2024-01-01","value":100},{"date":"2024-01-02","value":200}]"#;

    #[test]
    fn timeseries_body_is_detected() {
        assert!(looks_like_timeseries(SERIES));
        assert!(!looks_like_timeseries(r#"{"date":"2024-01-01"}"#));
        assert!(!looks_like_timeseries(r#"[{"a":1},{"b":2}]"#));
    }

    #[test]
    fn raw_score_adds_documented_weights() {
        // "api" + "chart" keywords, JSON, same host, timeseries body
        let response = json_response("https://site.com/api/chart", SERIES);
        let target = host_key("https://site.com/page");
        let raw = raw_score(&response, target.as_ref());
        assert!((raw - (2.0 + 2.0 + 1.0 + 0.5 + 3.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn size_bonuses_are_cumulative() {
        let response = NetworkResponse::new("https://x.org/feed", 200)
            .with_content_type("text/csv")
            .with_content_length(20_000);
        let raw = raw_score(&response, None);
        assert!((raw - (1.5 + 0.5 + 0.5)).abs() < f64::EPSILON);
    }

    #[test]
    fn scores_are_bounded_and_sorted() {
        let responses = vec![
            json_response("https://site.com/quote", "{}"),
            json_response(
                "https://site.com/api/data/series/history/prices/volume/market",
                SERIES,
            ),
            json_response("https://site.com/api/chart", SERIES),
            NetworkResponse::new("https://site.com/api/export.csv", 200)
                .with_content_type("text/csv"),
        ];
        let candidates = score(&responses, Some("https://site.com/"));
        assert!(!candidates.is_empty());
        for c in &candidates {
            assert!((0.0..=1.0).contains(&c.confidence));
        }
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        assert!((candidates[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn low_scores_and_non_data_are_dropped() {
        let responses = vec![
            json_response("https://google-analytics.com/collect", "{}"),
            NetworkResponse::new("https://site.com/api/data", 404)
                .with_content_type("application/json"),
            NetworkResponse::new("https://site.com/api/data", 200).with_content_type("text/html"),
        ];
        assert!(score(&responses, None).is_empty());
    }

    #[test]
    fn candidate_carries_shape_and_preview() {
        let responses = vec![json_response("https://site.com/api/chart", SERIES)];
        let candidate = best(&responses, None, DEFAULT_MIN_CONFIDENCE).unwrap();
        assert_eq!(
            candidate.detected_structure,
            Some(DetectedStructure::Timeseries)
        );
        assert_eq!(candidate.field_names, vec!["date", "value"]);
        assert_eq!(candidate.row_count_estimate, Some(2));
        assert_eq!(candidate.data_preview.as_deref(), Some(SERIES));
    }

    #[test]
    fn preview_is_truncated() {
        let body = format!("[{}]", "1,".repeat(400) + "1");
        let responses = vec![json_response("https://site.com/api/data", &body)];
        let candidate = score(&responses, None).remove(0);
        let preview = candidate.data_preview.unwrap();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_LEN + 3);
    }

    #[test]
    fn best_respects_threshold() {
        // "quote" + JSON = 3.0 -> 0.3
        let responses = vec![json_response("https://site.com/quote", "{}")];
        assert!(best(&responses, None, 0.3).is_some());
        assert!(best(&responses, None, 0.31).is_none());
    }

    #[test]
    fn filter_by_pattern_is_case_insensitive() {
        let responses = vec![
            json_response("https://site.com/API/chart", SERIES),
            json_response("https://site.com/data/prices", SERIES),
        ];
        let candidates = score(&responses, None);
        let kept = filter_by_pattern(&candidates, r"/api/").unwrap();
        assert_eq!(kept.len(), 1);
        assert!(filter_by_pattern(&candidates, "(").is_err());
    }
}
