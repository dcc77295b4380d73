//! Coinglass market overview snapshots.
//!
//! A Coinglass table is a one-row snapshot. Every known column present in
//! the first row becomes one point.

use data_fetch_scraper::Table;

use super::{timestamp_at, value_at};
use crate::convert::{btc_price, to_btc, to_usd};
use crate::{Category, DataType, NormalizeError, NormalizedDataPoint, Transformer};

const SOURCE: &str = "coinglass";

#[derive(Clone, Copy)]
enum Unit {
    Btc,
    Usd,
}

struct Field {
    column: &'static str,
    metric: &'static str,
    asset: &'static str,
    unit: Unit,
    confidence: u8,
    data_type: DataType,
    category: Category,
    /// Zero or negative means no data.
    positive_only: bool,
    /// A negative BTC amount is a real reading (net flows).
    signed: bool,
}

const FIELDS: &[Field] = &[
    Field {
        column: "spot_volume_24h",
        metric: "spot_volume_24h",
        asset: "ALL",
        unit: Unit::Btc,
        confidence: 95,
        data_type: DataType::Aggregate,
        category: Category::Volume,
        positive_only: false,
        signed: false,
    },
    Field {
        column: "futures_volume_24h",
        metric: "futures_volume_24h",
        asset: "ALL",
        unit: Unit::Btc,
        confidence: 93,
        data_type: DataType::Aggregate,
        category: Category::Volume,
        positive_only: false,
        signed: false,
    },
    Field {
        column: "open_interest",
        metric: "open_interest",
        asset: "ALL",
        unit: Unit::Btc,
        confidence: 92,
        data_type: DataType::Snapshot,
        category: Category::Derivatives,
        positive_only: true,
        signed: false,
    },
    Field {
        column: "net_inflow_24h",
        metric: "net_inflow_24h",
        asset: "ALL",
        unit: Unit::Btc,
        confidence: 90,
        data_type: DataType::Aggregate,
        category: Category::Flows,
        positive_only: false,
        signed: true,
    },
    Field {
        column: "futures_oi_all_exchanges",
        metric: "futures_oi_all_exchanges",
        asset: "ALL",
        unit: Unit::Usd,
        confidence: 98,
        data_type: DataType::Snapshot,
        category: Category::Derivatives,
        positive_only: true,
        signed: false,
    },
    Field {
        column: "total_liquidations_24h",
        metric: "liquidations_24h_total",
        asset: "ALL",
        unit: Unit::Usd,
        confidence: 96,
        data_type: DataType::Aggregate,
        category: Category::Liquidations,
        positive_only: true,
        signed: false,
    },
    Field {
        column: "long_liquidations",
        metric: "liquidations_24h_long",
        asset: "ALL",
        unit: Unit::Usd,
        confidence: 88,
        data_type: DataType::Aggregate,
        category: Category::Liquidations,
        positive_only: true,
        signed: false,
    },
    Field {
        column: "short_liquidations",
        metric: "liquidations_24h_short",
        asset: "ALL",
        unit: Unit::Usd,
        confidence: 88,
        data_type: DataType::Aggregate,
        category: Category::Liquidations,
        positive_only: true,
        signed: false,
    },
    Field {
        column: "btc_liquidations_24h",
        metric: "liquidations_24h",
        asset: "BTC",
        unit: Unit::Usd,
        confidence: 96,
        data_type: DataType::PerAsset,
        category: Category::Liquidations,
        positive_only: true,
        signed: false,
    },
    Field {
        column: "eth_liquidations_24h",
        metric: "liquidations_24h",
        asset: "ETH",
        unit: Unit::Usd,
        confidence: 94,
        data_type: DataType::PerAsset,
        category: Category::Liquidations,
        positive_only: true,
        signed: false,
    },
];

pub struct CoinglassTransformer;

impl Transformer for CoinglassTransformer {
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

        if let Some(value) = value_at(table, "btc_price", 0).filter(|v| *v > 0.0) {
            points.push(
                NormalizedDataPoint::new(SOURCE, "BTC", "btc_price", timestamp, value)
                    .with_usd(Some(value))
                    .with_btc(Some(1.0))
                    .with_confidence(98)
                    .with_data_type(DataType::Snapshot)
                    .with_category(Category::Market)
                    .with_raw_field("btc_price"),
            );
        }

        for field in FIELDS {
            let Some(value) = value_at(table, field.column, 0) else {
                continue;
            };
            if field.positive_only && value <= 0.0 {
                continue;
            }
            let has_btc = if field.signed { value != 0.0 } else { value > 0.0 };
            let (unit, usd, btc) = match field.unit {
                Unit::Btc => ("BTC", to_usd(value, "BTC", price), has_btc.then_some(value)),
                Unit::Usd => ("USD", Some(value), to_btc(value, "USD", price)),
            };
            points.push(
                NormalizedDataPoint::new(SOURCE, field.asset, field.metric, timestamp, value)
                    .with_usd(usd)
                    .with_btc(btc)
                    .with_unit(unit)
                    .with_confidence(field.confidence)
                    .with_data_type(field.data_type)
                    .with_category(field.category)
                    .with_raw_field(field.column),
            );
        }

        log::info!("Transformed {} data points from Coinglass", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use data_fetch_scraper::Cell;

    use super::*;

    fn snapshot(columns: &[(&str, Cell)]) -> Table {
        let mut table = Table::new(columns.iter().map(|(c, _)| (*c).to_owned()).collect());
        table.push_row(columns.iter().map(|(_, v)| v.clone()).collect());
        table
    }

    fn find<'a>(points: &'a [NormalizedDataPoint], asset: &str, metric: &str) -> &'a NormalizedDataPoint {
        points
            .iter()
            .find(|p| p.asset == asset && p.metric == metric)
            .unwrap()
    }

    #[test]
    fn converts_with_row_price() {
        let table = snapshot(&[
            ("timestamp", Cell::Text("2024-05-01 12:00:00".to_owned())),
            ("btc_price", Cell::Number(60_000.0)),
            ("spot_volume_24h", Cell::Number(2.0)),
            ("open_interest", Cell::Number(0.0)),
            ("net_inflow_24h", Cell::Number(-1.5)),
            ("total_liquidations_24h", Cell::Number(120_000.0)),
            ("eth_liquidations_24h", Cell::Number(30_000.0)),
        ]);

        let points = CoinglassTransformer.transform(&table).unwrap();
        assert_eq!(points.len(), 5);

        let price = find(&points, "BTC", "btc_price");
        assert_eq!(price.id, "coinglass_BTC_btc_price_20240501_120000");
        assert_eq!(price.value_btc, Some(1.0));
        assert_eq!(price.confidence, 98);

        let spot = find(&points, "ALL", "spot_volume_24h");
        assert_eq!(spot.unit, "BTC");
        assert_eq!(spot.value_usd, Some(120_000.0));
        assert_eq!(spot.value_btc, Some(2.0));
        assert_eq!(spot.category, Category::Volume);

        let inflow = find(&points, "ALL", "net_inflow_24h");
        assert_eq!(inflow.value_btc, Some(-1.5));
        assert_eq!(inflow.value_usd, Some(-90_000.0));

        let total = find(&points, "ALL", "liquidations_24h_total");
        assert_eq!(total.value_btc, Some(2.0));
        assert_eq!(total.unit, "USD");

        let eth = find(&points, "ETH", "liquidations_24h");
        assert_eq!(eth.data_type, DataType::PerAsset);
        assert_eq!(eth.confidence, 94);

        assert!(points.iter().all(|p| p.metric != "open_interest"));
    }

    #[test]
    fn negative_volume_has_no_btc_value() {
        let table = snapshot(&[
            ("timestamp", Cell::Text("2024-05-01".to_owned())),
            ("spot_volume_24h", Cell::Number(-3.0)),
            ("futures_volume_24h", Cell::Number(0.0)),
            ("net_inflow_24h", Cell::Number(-2.5)),
        ]);
        let points = CoinglassTransformer.transform(&table).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(find(&points, "ALL", "spot_volume_24h").value_btc, None);
        assert_eq!(find(&points, "ALL", "futures_volume_24h").value_btc, None);
        assert_eq!(find(&points, "ALL", "net_inflow_24h").value_btc, Some(-2.5));
    }

    #[test]
    fn without_price_conversions_are_empty() {
        let table = snapshot(&[
            ("timestamp", Cell::Text("2024-05-01".to_owned())),
            ("futures_volume_24h", Cell::Number(4.0)),
            ("long_liquidations", Cell::Number(10.0)),
            ("short_liquidations", Cell::Null),
        ]);
        let points = CoinglassTransformer.transform(&table).unwrap();
        assert_eq!(points.len(), 2);

        let futures = find(&points, "ALL", "futures_volume_24h");
        assert_eq!(futures.value_usd, None);
        assert_eq!(futures.value_btc, Some(4.0));

        let long = find(&points, "ALL", "liquidations_24h_long");
        assert_eq!(long.value_usd, Some(10.0));
        assert_eq!(long.value_btc, None);
    }

    #[test]
    fn empty_table_yields_nothing() {
        assert!(CoinglassTransformer.transform(&Table::default()).unwrap().is_empty());
    }
}
