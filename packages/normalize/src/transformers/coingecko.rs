//! CoinGecko exchange listings, one row per exchange, reduced to
//! cross-exchange aggregates.

use data_fetch_scraper::Table;
use serde_json::{Map, Value, json};

use super::{number, timestamp_at, value_at};
use crate::convert::{btc_price, to_usd};
use crate::{Category, NormalizeError, NormalizedDataPoint, Transformer};

const SOURCE: &str = "coingecko";
const VOLUME_COLUMN: &str = "trade_volume_24h_btc";
const TOP_EXCHANGES: usize = 5;

pub struct CoinGeckoTransformer;

fn top_exchanges(table: &Table) -> Vec<Value> {
    let mut ranked: Vec<(usize, f64)> = (0..table.len())
        .filter_map(|row| value_at(table, VOLUME_COLUMN, row).map(|v| (row, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(TOP_EXCHANGES)
        .map(|(row, _)| {
            let record: Map<String, Value> = ["id", "name", VOLUME_COLUMN]
                .into_iter()
                .filter_map(|column| {
                    let cell = table.get(row, column)?;
                    Some((column.to_owned(), serde_json::to_value(cell).unwrap_or_default()))
                })
                .collect();
            Value::Object(record)
        })
        .collect()
}

impl Transformer for CoinGeckoTransformer {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn transform(&self, table: &Table) -> Result<Vec<NormalizedDataPoint>, NormalizeError> {
        if table.is_empty() {
            return Ok(Vec::new());
        }
        let timestamp = timestamp_at(table, &["timestamp"], 0)?;
        let price = btc_price(table, 0);
        let mut points = Vec::new();

        if table.has_column(VOLUME_COLUMN) {
            let total: f64 = table.column(VOLUME_COLUMN).filter_map(number).sum();
            if total > 0.0 {
                points.push(
                    NormalizedDataPoint::new(SOURCE, "EXCHANGES", "exchange_volume_24h_total", timestamp, total)
                        .with_usd(to_usd(total, "BTC", price))
                        .with_btc(Some(total))
                        .with_unit("BTC")
                        .with_confidence(92)
                        .with_category(Category::Volume)
                        .with_raw_field(VOLUME_COLUMN)
                        .with_metadata("exchange_count", json!(table.len()))
                        .with_metadata("top_exchanges", Value::Array(top_exchanges(table))),
                );
            }
        }

        let scores: Vec<f64> = table.column("trust_score").filter_map(number).collect();
        if !scores.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            points.push(
                NormalizedDataPoint::new(SOURCE, "EXCHANGES", "avg_trust_score", timestamp, mean)
                    .with_unit("SCORE")
                    .with_confidence(95)
                    .with_category(Category::Trust)
                    .with_raw_field("trust_score")
                    .with_metadata("exchange_count", json!(table.len())),
            );
        }

        log::info!(
            "Transformed {} data points from CoinGecko ({} exchanges)",
            points.len(),
            table.len()
        );
        Ok(points)
    }
}
