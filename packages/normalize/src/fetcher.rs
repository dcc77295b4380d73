//! Query-time view over the warehouse.
//!
//! Stored points keep one row per source. [`DataFetcher::fetch`] pivots
//! them into one row per timestamp and, unless asked for the per-source
//! breakdown, folds sources together with an [`Aggregation`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use data_fetch_scraper::{Cell, Table};
use data_fetch_warehouse::{Coverage, Query, Warehouse};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::NormalizedDataPoint;

/// How values for one metric from several sources are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// First value in query order.
    #[default]
    Latest,
    Average,
    Sum,
    /// One column per source.
    All,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchMetadata {
    pub asset: String,
    pub metrics: Vec<String>,
    pub sources_used: Vec<String>,
    pub total_points: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub aggregation: Aggregation,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub data: Table,
    pub metadata: FetchMetadata,
}

pub struct DataFetcher {
    warehouse: Arc<Warehouse>,
}

/// Cells of one output row, with columns in first-seen order.
#[derive(Default)]
struct Pivot {
    columns: Vec<String>,
    rows: Vec<BTreeMap<String, Cell>>,
}

impl Pivot {
    fn set(&mut self, row: &mut BTreeMap<String, Cell>, column: String, cell: Cell) {
        if !self.columns.contains(&column) {
            self.columns.push(column.clone());
        }
        row.insert(column, cell);
    }

    fn into_table(self) -> Table {
        let mut table = Table::new(self.columns);
        for mut row in self.rows {
            let cells = table
                .columns()
                .iter()
                .map(|c| row.remove(c).unwrap_or(Cell::Null))
                .collect();
            table.push_row(cells);
        }
        table
    }
}

impl DataFetcher {
    #[must_use]
    pub const fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Time series of `metrics` for `asset`, newest first.
    ///
    /// Empty `sources` means every source.
    #[must_use]
    pub fn fetch(
        &self,
        asset: &str,
        metrics: &[String],
        date_range: Option<(NaiveDate, NaiveDate)>,
        sources: &[String],
        aggregation: Aggregation,
    ) -> FetchResult {
        let mut query = Query::new()
            .with_asset(asset)
            .with_metrics(metrics)
            .with_sources(sources);
        if let Some((start, end)) = date_range {
            query = query.with_date_range(start, end);
        }
        let points = self.warehouse.query(&query);

        let mut metadata = FetchMetadata {
            asset: asset.to_owned(),
            metrics: metrics.to_vec(),
            aggregation,
            ..FetchMetadata::default()
        };

        if points.is_empty() {
            metadata
                .warnings
                .push("No data found for the specified query".to_owned());
            return FetchResult {
                data: Table::default(),
                metadata,
            };
        }

        let mut sources_used: Vec<String> = points.iter().map(|p| p.source.clone()).collect();
        sources_used.sort();
        sources_used.dedup();
        metadata.sources_used = sources_used;
        metadata.total_points = points.len();
        metadata.date_range = points
            .iter()
            .map(|p| p.date)
            .min()
            .zip(points.iter().map(|p| p.date).max());

        for metric in metrics {
            let sources = distinct_sources(points.iter().filter(|p| p.metric == *metric));
            if sources.len() > 1 {
                metadata.warnings.push(format!(
                    "{metric}: Data from {} sources ({})",
                    sources.len(),
                    sources.join(", ")
                ));
            }
        }

        log::debug!(
            "Fetched {} points for {asset} across {} sources",
            points.len(),
            metadata.sources_used.len()
        );

        FetchResult {
            data: pivot(&points, metrics, aggregation),
            metadata,
        }
    }

    #[must_use]
    pub fn available_assets(&self) -> Vec<String> {
        self.warehouse.available_assets()
    }

    #[must_use]
    pub fn available_metrics(&self, asset: Option<&str>) -> Vec<String> {
        self.warehouse.available_metrics(asset)
    }

    #[must_use]
    pub fn coverage(&self, asset: Option<&str>, metric: Option<&str>) -> Coverage {
        self.warehouse.coverage(asset, metric)
    }
}

fn distinct_sources<'a>(points: impl Iterator<Item = &'a NormalizedDataPoint>) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for point in points {
        if !sources.contains(&point.source) {
            sources.push(point.source.clone());
        }
    }
    sources
}

fn pivot(points: &[NormalizedDataPoint], metrics: &[String], aggregation: Aggregation) -> Table {
    let mut timestamps: Vec<NaiveDateTime> = Vec::new();
    for point in points {
        if !timestamps.contains(&point.timestamp) {
            timestamps.push(point.timestamp);
        }
    }
    timestamps.sort_by(|a, b| b.cmp(a));

    let mut out = Pivot::default();
    for timestamp in timestamps {
        let at_time: Vec<&NormalizedDataPoint> =
            points.iter().filter(|p| p.timestamp == timestamp).collect();
        let mut row = BTreeMap::new();
        out.set(&mut row, "timestamp".to_owned(), Cell::Timestamp(timestamp));
        out.set(
            &mut row,
            "date".to_owned(),
            Cell::Text(timestamp.date().format("%Y-%m-%d").to_string()),
        );

        for metric in metrics {
            let of_metric: Vec<&NormalizedDataPoint> = at_time
                .iter()
                .copied()
                .filter(|p| p.metric == *metric)
                .collect();
            if of_metric.is_empty() {
                continue;
            }

            if aggregation == Aggregation::All {
                for point in &of_metric {
                    out.set(
                        &mut row,
                        format!("{metric}_{}", point.source),
                        Cell::Number(point.preferred_value()),
                    );
                    out.set(
                        &mut row,
                        format!("{metric}_source"),
                        Cell::Text(point.source.clone()),
                    );
                }
                continue;
            }

            let values: Vec<f64> = of_metric
                .iter()
                .map(|p| p.preferred_value())
                .filter(|v| !v.is_nan())
                .collect();
            let Some(first) = values.first().copied() else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let value = match aggregation {
                Aggregation::Average => values.iter().sum::<f64>() / values.len() as f64,
                Aggregation::Sum => values.iter().sum(),
                Aggregation::Latest | Aggregation::All => first,
            };
            let sources = distinct_sources(of_metric.iter().copied());
            #[allow(clippy::cast_precision_loss)]
            let source_count = sources.len() as f64;
            out.set(&mut row, metric.clone(), Cell::Number(value));
            out.set(
                &mut row,
                format!("{metric}_sources"),
                Cell::Text(sources.join(", ")),
            );
            out.set(
                &mut row,
                format!("{metric}_source_count"),
                Cell::Number(source_count),
            );
        }
        out.rows.push(row);
    }
    out.into_table()
}
