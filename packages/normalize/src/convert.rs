//! USD and BTC conversions driven by a BTC price found in the raw row.

use data_fetch_scraper::Table;

use crate::transformers::value_at;

/// Columns that may carry the BTC price, in lookup order.
pub const BTC_PRICE_COLUMNS: [&str; 5] = ["btc_price", "BTC_price", "btcPrice", "price_btc", "BTC"];

/// ETH price as a fraction of the BTC price. A rough fixed ratio, not a
/// market rate.
pub const ETH_BTC_PRICE_RATIO: f64 = 0.05;

/// First positive BTC price in `row`.
#[must_use]
pub fn btc_price(table: &Table, row: usize) -> Option<f64> {
    BTC_PRICE_COLUMNS
        .iter()
        .filter_map(|column| value_at(table, column, row))
        .find(|price| *price > 0.0)
}

/// Converts `value` in `unit` to USD. `None` when the unit needs a price
/// that is not known, or the unit is not convertible.
#[must_use]
pub fn to_usd(value: f64, unit: &str, btc_price: Option<f64>) -> Option<f64> {
    match (unit, btc_price) {
        ("USD", _) => Some(value),
        ("BTC", Some(price)) => Some(value * price),
        ("ETH", Some(price)) => Some(value * price * ETH_BTC_PRICE_RATIO),
        _ => None,
    }
}

/// Converts `value` in `unit` to BTC.
#[must_use]
pub fn to_btc(value: f64, unit: &str, btc_price: Option<f64>) -> Option<f64> {
    match (unit, btc_price) {
        ("BTC", _) => Some(value),
        ("USD", Some(price)) => Some(value / price),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use data_fetch_scraper::Cell;

    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(to_usd(2.0, "USD", None), Some(2.0));
        assert_eq!(to_usd(2.0, "BTC", Some(50_000.0)), Some(100_000.0));
        assert_eq!(to_usd(2.0, "ETH", Some(50_000.0)), Some(5_000.0));
        assert_eq!(to_usd(2.0, "BTC", None), None);
        assert_eq!(to_usd(2.0, "SCORE", Some(1.0)), None);

        assert_eq!(to_btc(3.0, "BTC", None), Some(3.0));
        assert_eq!(to_btc(100_000.0, "USD", Some(50_000.0)), Some(2.0));
        assert_eq!(to_btc(100_000.0, "USD", None), None);
        assert_eq!(to_btc(1.0, "ETH", Some(50_000.0)), None);
    }

    #[test]
    fn price_lookup_skips_missing_and_non_positive() {
        let mut table = Table::new(vec!["btc_price".to_owned(), "BTC".to_owned()]);
        table.push_row(vec![Cell::Number(0.0), Cell::Number(61_000.0)]);
        table.push_row(vec![Cell::Null, Cell::Null]);

        assert_eq!(btc_price(&table, 0), Some(61_000.0));
        assert_eq!(btc_price(&table, 1), None);
        assert_eq!(btc_price(&Table::default(), 0), None);
    }
}
