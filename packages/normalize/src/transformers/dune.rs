//! Dune query results.
//!
//! Query shapes are arbitrary, so asset and category are guessed from
//! column names. The last row is taken as the current value.

use data_fetch_scraper::Table;

use super::{last_row, numeric_columns, timestamp_at, value_at};
use crate::convert::{btc_price, to_btc, to_usd};
use crate::{Category, NormalizeError, NormalizedDataPoint, Transformer};

const SOURCE: &str = "dune";
const MAX_METRICS: usize = 10;
const NON_METRIC_COLUMNS: [&str; 5] = ["timestamp", "date", "time", "block_number", "block"];

pub struct DuneTransformer;

fn asset_for(column: &str) -> &'static str {
    let lower = column.to_lowercase();
    if lower.contains("btc") || lower.contains("bitcoin") {
        "BTC"
    } else if lower.contains("eth") || lower.contains("ethereum") {
        "ETH"
    } else if lower.contains("sol") || lower.contains("solana") {
        "SOL"
    } else {
        "ALL"
    }
}

fn category_for(column: &str) -> Category {
    let lower = column.to_lowercase();
    if lower.contains("volume") {
        Category::Volume
    } else if lower.contains("liquidation") {
        Category::Liquidations
    } else if lower.contains("flow") {
        Category::Flows
    } else if lower.contains("staking") || lower.contains("stake") {
        Category::Staking
    } else {
        Category::Market
    }
}

impl Transformer for DuneTransformer {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn transform(&self, table: &Table) -> Result<Vec<NormalizedDataPoint>, NormalizeError> {
        if table.is_empty() {
            return Ok(Vec::new());
        }
        let timestamp = timestamp_at(table, &["timestamp", "date", "time"], 0)?;
        let row = last_row(table);
        let price = btc_price(table, row);

        let points: Vec<NormalizedDataPoint> = numeric_columns(table)
            .into_iter()
            .filter(|c| !NON_METRIC_COLUMNS.contains(&c.as_str()))
            .take(MAX_METRICS)
            .filter_map(|column| {
                let value = value_at(table, &column, row)?;
                Some(
                    NormalizedDataPoint::new(SOURCE, asset_for(&column), &column, timestamp, value)
                        .with_usd(price.and(to_usd(value, "USD", price)))
                        .with_btc(to_btc(value, "USD", price))
                        .with_confidence(85)
                        .with_category(category_for(&column))
                        .with_raw_field(&column),
                )
            })
            .collect();

        log::info!("Transformed {} data points from DUNE", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use data_fetch_scraper::Cell;

    use super::*;

    #[test]
    fn guesses_asset_and_category_from_names() {
        assert_eq!(asset_for("total_eth_deposited"), "ETH");
        assert_eq!(asset_for("Bitcoin_Flow"), "BTC");
        assert_eq!(asset_for("validators"), "ALL");
        assert_eq!(category_for("total_eth_deposited"), Category::Market);
        assert_eq!(category_for("eth_staked"), Category::Staking);
        assert_eq!(category_for("dex_volume"), Category::Volume);
        assert_eq!(category_for("exchange_inflow"), Category::Flows);
    }

    #[test]
    fn reads_last_row_and_skips_block_columns() {
        let mut table = Table::new(vec![
            "date".to_owned(),
            "block_number".to_owned(),
            "eth_staked".to_owned(),
            "validators".to_owned(),
            "label".to_owned(),
        ]);
        table.push_row(vec![
            Cell::Text("2024-01-01".to_owned()),
            Cell::Number(100.0),
            Cell::Number(1.0),
            Cell::Number(10.0),
            Cell::Text("a".to_owned()),
        ]);
        table.push_row(vec![
            Cell::Text("2024-01-02".to_owned()),
            Cell::Number(101.0),
            Cell::Number(2.0),
            Cell::Null,
            Cell::Text("b".to_owned()),
        ]);

        let points = DuneTransformer.transform(&table).unwrap();
        assert_eq!(points.len(), 1);
        let staked = &points[0];
        assert_eq!(staked.asset, "ETH");
        assert!((staked.value - 2.0).abs() < f64::EPSILON);
        assert_eq!(staked.confidence, 85);
        assert_eq!(staked.value_usd, None);
        assert_eq!(staked.timestamp.to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn converts_when_price_present_in_row() {
        let mut table = Table::new(vec!["btc_price".to_owned(), "flow_usd".to_owned()]);
        table.push_row(vec![Cell::Number(50_000.0), Cell::Number(100_000.0)]);

        let points = DuneTransformer.transform(&table).unwrap();
        let flow = points.iter().find(|p| p.metric == "flow_usd").unwrap();
        assert_eq!(flow.value_usd, Some(100_000.0));
        assert_eq!(flow.value_btc, Some(2.0));
        assert_eq!(flow.category, Category::Flows);
    }
}
