//! Checks that normalization kept the information in a raw table.
//!
//! Basic checks run offline. When an LLM oracle is configured its verdict
//! is merged into the same report.

use std::collections::{BTreeMap, BTreeSet};

use data_fetch_ai::review::{OracleVerdict, ValidationOracle};
use data_fetch_scraper::Table;
use serde::Serialize;
use serde_json::{Value, json};

use crate::NormalizedDataPoint;
use crate::transformers::numeric_columns;

const SAMPLE_COLUMNS: usize = 10;
const SAMPLE_VALUE_CHARS: usize = 100;

/// Outcome of validating one source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub raw_field_count: usize,
    pub normalized_metric_count: usize,
    pub missing_fields: Vec<String>,
    pub suggestions: Vec<String>,
    pub raw_sample: Option<BTreeMap<String, Value>>,
    pub normalized_sample: Option<Value>,
}

impl ValidationReport {
    fn merge(&mut self, verdict: OracleVerdict) {
        self.passed = self.passed && verdict.passed;
        self.warnings.extend(verdict.warnings);
        self.errors.extend(verdict.errors);
        self.suggestions.extend(verdict.suggestions);
        let missing: BTreeSet<String> = self
            .missing_fields
            .drain(..)
            .chain(verdict.missing_fields)
            .collect();
        self.missing_fields = missing.into_iter().collect();
    }
}

/// Validates normalized output against its raw table.
#[derive(Default)]
pub struct NormalizationValidator {
    oracle: Option<ValidationOracle>,
}

impl NormalizationValidator {
    /// A validator that runs the basic checks only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an LLM oracle when credentials are present in the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            oracle: ValidationOracle::from_env(),
        }
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: ValidationOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Validates the points produced from `raw` for one source.
    pub async fn validate(
        &self,
        raw: &Table,
        points: &[NormalizedDataPoint],
        source: &str,
    ) -> ValidationReport {
        let mut report = basic_checks(raw, points);
        let raw_summary = summarize_raw(raw);
        let normalized_summary = summarize_points(points);

        match &self.oracle {
            Some(oracle) => match oracle.review(source, &raw_summary, &normalized_summary).await {
                Ok(verdict) => report.merge(verdict),
                Err(e) => {
                    log::warn!("AI validation failed for {source}: {e}");
                    report
                        .warnings
                        .push(format!("AI validation failed: {e}. Using basic validation only."));
                }
            },
            None => report
                .warnings
                .push("AI validation unavailable. Using basic validation only.".to_owned()),
        }

        report.raw_sample = match raw_summary {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        };
        report.normalized_sample = Some(normalized_summary);

        if report.passed {
            log::info!("Validation passed for {source}");
        } else {
            log::warn!("Validation failed for {source}: {:?}", report.errors);
        }
        report
    }
}

fn basic_checks(raw: &Table, points: &[NormalizedDataPoint]) -> ValidationReport {
    let mut report = ValidationReport {
        passed: true,
        ..ValidationReport::default()
    };

    if raw.is_empty() {
        report.passed = false;
        report.errors.push("Raw DataFrame is empty".to_owned());
        return report;
    }
    if points.is_empty() {
        report.passed = false;
        report
            .errors
            .push("No normalized data points created".to_owned());
        return report;
    }

    let value_fields: Vec<String> = numeric_columns(raw)
        .into_iter()
        .filter(|c| {
            let lower = c.to_lowercase();
            !lower.contains("timestamp") && !lower.contains("date")
        })
        .collect();
    let metrics: BTreeSet<&str> = points.iter().map(|p| p.metric.as_str()).collect();
    report.raw_field_count = value_fields.len();
    report.normalized_metric_count = metrics.len();

    if report.raw_field_count > report.normalized_metric_count * 2 {
        report.warnings.push(format!(
            "Raw data has {} numeric fields but only {} normalized metrics. \
             Some fields may not be normalized.",
            report.raw_field_count, report.normalized_metric_count
        ));
    }

    let has_time = raw.columns().iter().any(|c| {
        let lower = c.to_lowercase();
        lower.contains("timestamp") || lower.contains("date") || lower.contains("time")
    });
    if !has_time {
        report
            .warnings
            .push("No timestamp/date column found in raw data".to_owned());
    }
    report
}

/// Compact description of a raw table for the oracle.
#[must_use]
pub fn summarize_raw(raw: &Table) -> Value {
    if raw.is_empty() {
        return json!({ "empty": true });
    }

    let mut samples = serde_json::Map::new();
    for column in raw.columns().iter().take(SAMPLE_COLUMNS) {
        if let Some(cell) = raw.column(column).find(|c| !c.is_null()) {
            let text: String = cell.to_string().chars().take(SAMPLE_VALUE_CHARS).collect();
            samples.insert(column.clone(), Value::String(text));
        }
    }

    json!({
        "row_count": raw.len(),
        "column_count": raw.columns().len(),
        "columns": raw.columns(),
        "numeric_columns": numeric_columns(raw),
        "sample_values": samples,
    })
}

/// Compact description of normalized points for the oracle.
#[must_use]
pub fn summarize_points(points: &[NormalizedDataPoint]) -> Value {
    let Some(first) = points.first() else {
        return json!({ "empty": true });
    };

    let metrics: BTreeSet<&str> = points.iter().map(|p| p.metric.as_str()).collect();
    let assets: BTreeSet<&str> = points.iter().map(|p| p.asset.as_str()).collect();
    let categories: BTreeSet<String> = points.iter().map(|p| p.category.to_string()).collect();

    json!({
        "point_count": points.len(),
        "unique_metrics": metrics,
        "unique_assets": assets,
        "unique_categories": categories,
        "sample_point": {
            "metric": first.metric,
            "value": first.value,
            "value_usd": first.value_usd,
            "asset": first.asset,
            "category": first.category.to_string(),
        },
    })
}
