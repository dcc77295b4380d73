//! Invezz liquidation totals.

use data_fetch_scraper::Table;
use serde_json::json;

use super::{timestamp_at, value_at};
use crate::convert::{btc_price, to_btc};
use crate::{Category, NormalizeError, NormalizedDataPoint, Transformer};

const SOURCE: &str = "invezz";

/// `(column, metric, confidence)`; all values are positive USD.
const FIELDS: [(&str, &str, u8); 3] = [
    ("total_liquidations_24h", "liquidations_24h_total", 90),
    ("long_liquidations", "liquidations_24h_long", 88),
    ("short_liquidations", "liquidations_24h_short", 88),
];

pub struct InvezzTransformer;

impl Transformer for InvezzTransformer {
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

        for (column, metric, confidence) in FIELDS {
            let Some(value) = value_at(table, column, 0).filter(|v| *v > 0.0) else {
                continue;
            };
            let mut point = NormalizedDataPoint::new(SOURCE, "ALL", metric, timestamp, value)
                .with_usd(Some(value))
                .with_btc(to_btc(value, "USD", price))
                .with_confidence(confidence)
                .with_category(Category::Liquidations)
                .with_raw_field(column);
            if column == "total_liquidations_24h" {
                point = point
                    .with_metadata("long_liquidations", json!(value_at(table, "long_liquidations", 0)))
                    .with_metadata("short_liquidations", json!(value_at(table, "short_liquidations", 0)));
            }
            points.push(point);
        }

        log::info!("Transformed {} data points from Invezz", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use data_fetch_scraper::Cell;

    use super::*;

    #[test]
    fn total_carries_long_and_short_breakdown() {
        let mut table = Table::new(vec![
            "timestamp".to_owned(),
            "total_liquidations_24h".to_owned(),
            "long_liquidations".to_owned(),
            "short_liquidations".to_owned(),
        ]);
        table.push_row(vec![
            Cell::Text("2024-02-02T08:30:00".to_owned()),
            Cell::Number(300.0),
            Cell::Number(200.0),
            Cell::Number(0.0),
        ]);

        let points = InvezzTransformer.transform(&table).unwrap();
        assert_eq!(points.len(), 2);

        let total = &points[0];
        assert_eq!(total.id, "invezz_ALL_liquidations_24h_total_20240202_083000");
        assert_eq!(total.confidence, 90);
        assert_eq!(total.metadata["long_liquidations"], json!(200.0));
        assert_eq!(total.metadata["short_liquidations"], json!(0.0));
        assert_eq!(total.value_btc, None);

        assert_eq!(points[1].metric, "liquidations_24h_long");
        assert_eq!(points[1].confidence, 88);
        assert!(points[1].metadata.is_empty());
    }
}
