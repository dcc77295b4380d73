//! The Block chart series. The last row of a daily series is the current
//! reading.

use data_fetch_scraper::Table;

use super::{last_row, numeric_columns, timestamp_at, value_at};
use crate::convert::{btc_price, to_btc};
use crate::{Category, NormalizeError, NormalizedDataPoint, Transformer};

const SOURCE: &str = "theblock";
const MAX_EXTRA_METRICS: usize = 5;

/// `(column, asset)` for the 7-day moving average volumes.
const VOLUME_7DMA: [(&str, &str); 2] = [("btc_volume_7dma", "BTC"), ("eth_volume_7dma", "ETH")];

pub struct TheBlockTransformer;

impl Transformer for TheBlockTransformer {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn transform(&self, table: &Table) -> Result<Vec<NormalizedDataPoint>, NormalizeError> {
        if table.is_empty() {
            return Ok(Vec::new());
        }
        let row = last_row(table);
        let timestamp = timestamp_at(table, &["date", "timestamp"], row)?;
        let price = btc_price(table, row);
        let mut points = Vec::new();

        for (column, asset) in VOLUME_7DMA {
            let Some(value) = value_at(table, column, row).filter(|v| *v > 0.0) else {
                continue;
            };
            points.push(
                NormalizedDataPoint::new(SOURCE, asset, "volume_7dma", timestamp, value)
                    .with_usd(Some(value))
                    .with_btc(to_btc(value, "USD", price))
                    .with_confidence(94)
                    .with_category(Category::Volume)
                    .with_raw_field(column),
            );
        }

        let extra = numeric_columns(table).into_iter().filter(|c| {
            !matches!(c.as_str(), "date" | "timestamp") && VOLUME_7DMA.iter().all(|(v, _)| v != c)
        });
        for column in extra.take(MAX_EXTRA_METRICS) {
            let Some(value) = value_at(table, &column, row) else {
                continue;
            };
            let lower = column.to_lowercase();
            let asset = if lower.contains("btc") {
                "BTC"
            } else if lower.contains("eth") {
                "ETH"
            } else {
                "ALL"
            };
            points.push(
                NormalizedDataPoint::new(SOURCE, asset, &column, timestamp, value)
                    .with_usd(price.map(|_| value))
                    .with_btc(to_btc(value, "USD", price))
                    .with_category(Category::Market)
                    .with_raw_field(&column),
            );
        }

        log::info!("Transformed {} data points from The Block", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use data_fetch_scraper::Cell;

    use super::*;

    fn series() -> Table {
        let mut table = Table::new(vec![
            "date".to_owned(),
            "btc_volume_7dma".to_owned(),
            "eth_volume_7dma".to_owned(),
            "sol_volume".to_owned(),
        ]);
        table.push_row(vec![
            Cell::Text("2024-04-01".to_owned()),
            Cell::Number(5.0e9),
            Cell::Number(2.0e9),
            Cell::Number(1.0e8),
        ]);
        table.push_row(vec![
            Cell::Text("2024-04-02".to_owned()),
            Cell::Number(6.0e9),
            Cell::Number(0.0),
            Cell::Number(2.0e8),
        ]);
        table
    }

    #[test]
    fn reads_latest_row() {
        let points = TheBlockTransformer.transform(&series()).unwrap();
        assert_eq!(points.len(), 2);

        let btc = &points[0];
        assert_eq!(btc.id, "theblock_BTC_volume_7dma_20240402_000000");
        assert_eq!(btc.value_usd, Some(6.0e9));
        assert_eq!(btc.value_btc, None);
        assert_eq!(btc.confidence, 94);

        let sol = &points[1];
        assert_eq!(sol.metric, "sol_volume");
        assert_eq!(sol.asset, "ALL");
        assert_eq!(sol.category, Category::Market);
        assert_eq!(sol.value_usd, None);
        assert_eq!(sol.confidence, 90);
    }
}
