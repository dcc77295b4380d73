#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Turns scraped tables into [`NormalizedDataPoint`]s.
//!
//! Every known source has a [`Transformer`] that knows its raw column
//! names. Around the transformers sit the pieces that route and check
//! their output:
//!
//! - [`category`] maps metrics to [`Category`] families for filtering
//! - [`assets`] maps asset names to the configured sites that cover them
//! - [`validation`] compares raw tables with what was normalized
//! - [`fetcher`] aggregates stored points across sources at query time
//! - [`realtime`] runs scrape, normalize, validate and store in one call

pub mod assets;
pub mod category;
pub mod convert;
pub mod fetcher;
pub mod realtime;
pub mod transformers;
pub mod validation;

use std::collections::BTreeMap;

use data_fetch_scraper::Table;
use thiserror::Error;

pub use data_fetch_normalize_models::{Category, DataType, NormalizedDataPoint};

/// Errors raised while normalizing one table.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Invalid timestamp in column '{column}': '{value}'")]
    Timestamp { column: String, value: String },
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

/// Source-specific conversion of a raw table.
pub trait Transformer: Send + Sync {
    /// Source name written into every point.
    fn source(&self) -> &'static str;

    /// Converts `table` into points. An empty table yields no points.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::Timestamp`] if the timestamp column holds
    /// a value that is not a date.
    fn transform(&self, table: &Table) -> Result<Vec<NormalizedDataPoint>, NormalizeError>;
}

/// Sources with a transformer.
pub const SOURCES: [&str; 5] = ["coinglass", "invezz", "coingecko", "dune", "theblock"];

/// Transformer for a source name.
#[must_use]
pub fn transformer_for(source: &str) -> Option<Box<dyn Transformer>> {
    use transformers::{coingecko, coinglass, dune, invezz, theblock};

    match source {
        "coinglass" => Some(Box::new(coinglass::CoinglassTransformer)),
        "invezz" => Some(Box::new(invezz::InvezzTransformer)),
        "coingecko" => Some(Box::new(coingecko::CoinGeckoTransformer)),
        "dune" => Some(Box::new(dune::DuneTransformer)),
        "theblock" => Some(Box::new(theblock::TheBlockTransformer)),
        _ => None,
    }
}

/// Source name for a site id: a known source contained in the id, or the
/// id's first `_`-separated part.
#[must_use]
pub fn source_for_site(site_id: &str) -> String {
    let lower = site_id.to_lowercase();
    SOURCES
        .iter()
        .find(|source| lower.contains(*source))
        .map_or_else(
            || site_id.split('_').next().unwrap_or(site_id).to_owned(),
            |source| (*source).to_owned(),
        )
}

/// Points from every table plus one warning per table that was skipped.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub points: Vec<NormalizedDataPoint>,
    pub skipped: Vec<String>,
}

/// Runs the matching transformer over each site's table.
///
/// Tables without a transformer, or whose transformer fails, are logged
/// and skipped; the rest are still normalized.
#[must_use]
pub fn normalize_tables(tables: &BTreeMap<String, Table>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (site_id, table) in tables {
        if table.is_empty() {
            log::warn!("Empty table for {site_id}");
            continue;
        }
        let source = source_for_site(site_id);
        let Some(transformer) = transformer_for(&source) else {
            log::warn!("No transformer found for source: {source} (site_id: {site_id})");
            batch
                .skipped
                .push(format!("{site_id}: {}", NormalizeError::UnknownSource(source)));
            continue;
        };
        match transformer.transform(table) {
            Ok(points) => {
                log::info!("Normalized {} points from {source}", points.len());
                batch.points.extend(points);
            }
            Err(e) => {
                log::error!("Error normalizing {source}: {e}");
                batch.skipped.push(format!("{site_id}: {e}"));
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use data_fetch_scraper::Cell;

    use super::*;

    #[test]
    fn source_is_resolved_from_site_id() {
        assert_eq!(source_for_site("coinglass_btc_overview"), "coinglass");
        assert_eq!(source_for_site("Dune_ETH_Staking"), "dune");
        assert_eq!(source_for_site("theblock_exchange_volume"), "theblock");
        assert_eq!(source_for_site("bitcoin_com_flows"), "bitcoin");
        assert_eq!(source_for_site("standalone"), "standalone");
    }

    #[test]
    fn every_source_has_a_transformer() {
        for source in SOURCES {
            assert_eq!(transformer_for(source).unwrap().source(), source);
        }
        assert!(transformer_for("bitcoin").is_none());
    }

    #[test]
    fn unknown_and_broken_tables_are_skipped() {
        let mut good = Table::new(vec!["timestamp".to_owned(), "btc_price".to_owned()]);
        good.push_row(vec![Cell::Text("2024-01-01".to_owned()), Cell::Number(42_000.0)]);
        let mut broken = Table::new(vec!["timestamp".to_owned(), "total_liquidations_24h".to_owned()]);
        broken.push_row(vec![Cell::Text("soon".to_owned()), Cell::Number(1.0)]);
        let mut unknown = Table::new(vec!["x".to_owned()]);
        unknown.push_row(vec![Cell::Number(1.0)]);

        let mut tables = BTreeMap::new();
        tables.insert("coinglass_btc".to_owned(), good);
        tables.insert("invezz_liquidations".to_owned(), broken);
        tables.insert("mystery_site".to_owned(), unknown);
        tables.insert("dune_empty".to_owned(), Table::default());

        let batch = normalize_tables(&tables);
        assert_eq!(batch.points.len(), 1);
        assert_eq!(batch.points[0].metric, "btc_price");
        assert_eq!(batch.skipped.len(), 2);
        assert!(batch.skipped.iter().any(|s| s.starts_with("invezz_liquidations: Invalid timestamp")));
        assert!(batch.skipped.iter().any(|s| s == "mystery_site: Unknown source: mystery"));
    }
}
