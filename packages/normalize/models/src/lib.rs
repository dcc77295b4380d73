#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The unified point schema every source is normalized into.
//!
//! A [`NormalizedDataPoint`] is one metric value for one asset at one
//! instant, tagged with where it came from and how much to trust it. Its
//! id is derived from `(source, asset, metric, timestamp)`, so the same
//! observation scraped twice collapses to one row in the warehouse.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Unit assigned when a transformer does not say otherwise.
pub const DEFAULT_UNIT: &str = "USD";

/// Confidence assigned when a transformer does not say otherwise.
pub const DEFAULT_CONFIDENCE: u8 = 90;

/// How a value was aggregated at the source.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    /// Summed across exchanges or assets.
    #[default]
    Aggregate,
    PerAsset,
    PerExchange,
    /// A point-in-time reading such as a price or open interest.
    Snapshot,
}

/// Metric family used for filtering.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Category {
    Volume,
    Liquidations,
    Derivatives,
    Flows,
    #[default]
    Market,
    Trust,
    Staking,
}

/// One normalized observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDataPoint {
    /// `{source}_{asset}_{metric}_{YYYYmmdd_HHMMSS}`.
    pub id: String,
    pub source: String,
    /// `BTC`, `ETH`, `SOL`, `ALL` or `EXCHANGES`.
    pub asset: String,
    pub metric: String,
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,
    pub value: f64,
    pub value_usd: Option<f64>,
    pub value_btc: Option<f64>,
    pub unit: String,
    /// Quality score from 0 to 100.
    pub confidence: u8,
    pub data_type: DataType,
    pub category: Category,
    /// Column the value was read from.
    pub raw_source_field: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl NormalizedDataPoint {
    /// Creates a point with default unit, confidence, type and category.
    #[must_use]
    pub fn new(source: &str, asset: &str, metric: &str, timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            id: point_id(source, asset, metric, timestamp),
            source: source.to_owned(),
            asset: asset.to_owned(),
            metric: metric.to_owned(),
            timestamp,
            date: timestamp.date(),
            value,
            value_usd: None,
            value_btc: None,
            unit: DEFAULT_UNIT.to_owned(),
            confidence: DEFAULT_CONFIDENCE,
            data_type: DataType::default(),
            category: Category::default(),
            raw_source_field: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_usd(mut self, value: Option<f64>) -> Self {
        self.value_usd = value;
        self
    }

    #[must_use]
    pub const fn with_btc(mut self, value: Option<f64>) -> Self {
        self.value_btc = value;
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        unit.clone_into(&mut self.unit);
        self
    }

    #[must_use]
    pub const fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub const fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    #[must_use]
    pub const fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_raw_field(mut self, field: &str) -> Self {
        field.clone_into(&mut self.raw_source_field);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_owned(), value);
        self
    }

    /// `value_usd` when known, otherwise the raw value.
    #[must_use]
    pub fn preferred_value(&self) -> f64 {
        self.value_usd.unwrap_or(self.value)
    }
}

/// Builds the stable point id.
#[must_use]
pub fn point_id(source: &str, asset: &str, metric: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{source}_{asset}_{metric}_{}",
        timestamp.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    #[test]
    fn id_and_defaults() {
        let point = NormalizedDataPoint::new("coinglass", "BTC", "btc_price", ts(), 65_000.0);
        assert_eq!(point.id, "coinglass_BTC_btc_price_20240305_140709");
        assert_eq!(point.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(point.unit, "USD");
        assert_eq!(point.confidence, 90);
        assert_eq!(point.data_type, DataType::Aggregate);
        assert_eq!(point.category, Category::Market);
        assert!((point.preferred_value() - 65_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn preferred_value_uses_usd_when_known() {
        let point = NormalizedDataPoint::new("x", "ALL", "spot_volume_24h", ts(), 2.0).with_usd(Some(130_000.0));
        assert!((point.preferred_value() - 130_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn enums_use_snake_case_names() {
        assert_eq!(DataType::PerAsset.to_string(), "per_asset");
        assert_eq!(Category::from_str("Liquidations").unwrap(), Category::Liquidations);
        assert_eq!(
            serde_json::to_value(Category::Derivatives).unwrap(),
            serde_json::json!("derivatives")
        );
    }
}
