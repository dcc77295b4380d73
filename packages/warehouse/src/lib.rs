#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory warehouse of [`NormalizedDataPoint`]s.
//!
//! Points are appended under a single writer lock. A point whose id is
//! already stored is dropped, so the first write of an observation wins.
//! Every point from every source is kept; aggregation across sources
//! happens at query time.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use data_fetch_normalize_models::NormalizedDataPoint;
use serde::Serialize;

/// Filters for [`Warehouse::query`]. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub asset: Option<String>,
    pub metrics: Vec<String>,
    /// Inclusive on both ends, compared on the point's date.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub sources: Vec<String>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_asset(mut self, asset: &str) -> Self {
        self.asset = Some(asset.to_owned());
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: &[String]) -> Self {
        self.metrics = metrics.to_vec();
        self
    }

    #[must_use]
    pub const fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some((start, end));
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: &[String]) -> Self {
        self.sources = sources.to_vec();
        self
    }

    fn matches(&self, point: &NormalizedDataPoint) -> bool {
        self.asset.as_ref().is_none_or(|a| *a == point.asset)
            && (self.metrics.is_empty() || self.metrics.contains(&point.metric))
            && self
                .date_range
                .is_none_or(|(start, end)| point.date >= start && point.date <= end)
            && (self.sources.is_empty() || self.sources.contains(&point.source))
    }
}

/// What the warehouse holds for an asset/metric selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub total_points: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub sources: Vec<String>,
    pub assets: Vec<String>,
    pub metrics: Vec<String>,
}

/// Point counts per source, asset and metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_points: usize,
    pub sources: BTreeMap<String, usize>,
    pub assets: BTreeMap<String, usize>,
    pub metrics: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct Store {
    points: Vec<NormalizedDataPoint>,
    ids: HashSet<String>,
}

impl Store {
    fn insert(&mut self, point: NormalizedDataPoint) -> bool {
        if self.ids.contains(&point.id) {
            log::debug!("Duplicate data point skipped: {}", point.id);
            return false;
        }
        self.ids.insert(point.id.clone());
        self.points.push(point);
        true
    }
}

/// Thread-safe point store.
#[derive(Debug, Default)]
pub struct Warehouse {
    store: RwLock<Store>,
}

impl Warehouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a point. Returns `false` if its id was already present.
    pub fn add(&self, point: NormalizedDataPoint) -> bool {
        self.write().insert(point)
    }

    /// Stores points under one lock. Returns how many were new.
    pub fn add_many(&self, points: impl IntoIterator<Item = NormalizedDataPoint>) -> usize {
        let mut store = self.write();
        points.into_iter().filter(|p| store.insert(p.clone())).count()
    }

    /// Matching points, newest first.
    #[must_use]
    pub fn query(&self, query: &Query) -> Vec<NormalizedDataPoint> {
        let mut matched: Vec<NormalizedDataPoint> = self
            .read()
            .points
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }

    fn distinct(&self, pick: impl Fn(&NormalizedDataPoint) -> Option<&str>) -> Vec<String> {
        let store = self.read();
        let values: BTreeSet<&str> = store.points.iter().filter_map(pick).collect();
        values.into_iter().map(str::to_owned).collect()
    }

    #[must_use]
    pub fn available_assets(&self) -> Vec<String> {
        self.distinct(|p| Some(&p.asset))
    }

    /// Metrics present, optionally only for one asset.
    #[must_use]
    pub fn available_metrics(&self, asset: Option<&str>) -> Vec<String> {
        self.distinct(|p| asset.is_none_or(|a| a == p.asset).then_some(p.metric.as_str()))
    }

    #[must_use]
    pub fn available_sources(&self) -> Vec<String> {
        self.distinct(|p| Some(&p.source))
    }

    #[must_use]
    pub fn coverage(&self, asset: Option<&str>, metric: Option<&str>) -> Coverage {
        let store = self.read();
        let selected: Vec<&NormalizedDataPoint> = store
            .points
            .iter()
            .filter(|p| asset.is_none_or(|a| a == p.asset) && metric.is_none_or(|m| m == p.metric))
            .collect();

        let sorted = |f: fn(&NormalizedDataPoint) -> &str| -> Vec<String> {
            let set: BTreeSet<&str> = selected.iter().map(|p| f(p)).collect();
            set.into_iter().map(str::to_owned).collect()
        };
        let first = selected.iter().map(|p| p.date).min();
        let last = selected.iter().map(|p| p.date).max();

        Coverage {
            total_points: selected.len(),
            date_range: first.zip(last),
            sources: sorted(|p| &p.source),
            assets: sorted(|p| &p.asset),
            metrics: sorted(|p| &p.metric),
        }
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let store = self.read();
        let mut stats = Stats {
            total_points: store.points.len(),
            ..Stats::default()
        };
        for point in &store.points {
            *stats.sources.entry(point.source.clone()).or_default() += 1;
            *stats.assets.entry(point.asset.clone()).or_default() += 1;
            *stats.metrics.entry(point.metric.clone()).or_default() += 1;
        }
        stats
    }

    /// Every stored point in insertion order.
    #[must_use]
    pub fn points(&self) -> Vec<NormalizedDataPoint> {
        self.read().points.clone()
    }

    pub fn clear(&self) {
        *self.write() = Store::default();
        log::info!("Warehouse cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDateTime;

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn point(source: &str, asset: &str, metric: &str, ts: NaiveDateTime, value: f64) -> NormalizedDataPoint {
        NormalizedDataPoint::new(source, asset, metric, ts, value)
    }

    #[test]
    fn first_write_wins() {
        let warehouse = Warehouse::new();
        assert!(warehouse.add(point("coinglass", "BTC", "btc_price", at(1, 0), 1.0)));
        assert!(!warehouse.add(point("coinglass", "BTC", "btc_price", at(1, 0), 2.0)));

        let added = warehouse.add_many(vec![
            point("coinglass", "BTC", "btc_price", at(1, 0), 3.0),
            point("coinglass", "BTC", "btc_price", at(2, 0), 4.0),
            point("coinglass", "BTC", "btc_price", at(2, 0), 5.0),
        ]);
        assert_eq!(added, 1);
        assert_eq!(warehouse.len(), 2);
        let values: Vec<f64> = warehouse.points().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 4.0]);
    }

    #[test]
    fn query_filters_and_sorts_newest_first() {
        let warehouse = Warehouse::new();
        warehouse.add_many(vec![
            point("coinglass", "ALL", "spot_volume_24h", at(1, 0), 1.0),
            point("theblock", "ALL", "spot_volume_24h", at(3, 0), 2.0),
            point("coinglass", "ALL", "open_interest", at(2, 0), 3.0),
            point("coinglass", "BTC", "btc_price", at(5, 0), 4.0),
        ]);

        let all = warehouse.query(&Query::new().with_asset("ALL"));
        let days: Vec<u32> = all.iter().map(|p| chrono::Datelike::day(&p.date)).collect();
        assert_eq!(days, vec![3, 2, 1]);

        let volume = warehouse.query(
            &Query::new()
                .with_metrics(&["spot_volume_24h".to_owned()])
                .with_sources(&["coinglass".to_owned()]),
        );
        assert_eq!(volume.len(), 1);

        let ranged = warehouse.query(&Query::new().with_date_range(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        ));
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn listings_coverage_and_stats() {
        let warehouse = Warehouse::new();
        assert_eq!(warehouse.coverage(None, None), Coverage::default());

        warehouse.add_many(vec![
            point("dune", "ETH", "total_eth_deposited", at(4, 0), 1.0),
            point("coinglass", "BTC", "btc_price", at(2, 0), 2.0),
            point("coinglass", "ALL", "spot_volume_24h", at(3, 0), 3.0),
        ]);

        assert_eq!(warehouse.available_assets(), vec!["ALL", "BTC", "ETH"]);
        assert_eq!(warehouse.available_sources(), vec!["coinglass", "dune"]);
        assert_eq!(warehouse.available_metrics(Some("BTC")), vec!["btc_price"]);
        assert_eq!(warehouse.available_metrics(None).len(), 3);

        let coverage = warehouse.coverage(None, None);
        assert_eq!(coverage.total_points, 3);
        assert_eq!(
            coverage.date_range,
            Some((
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
            ))
        );
        assert_eq!(warehouse.coverage(Some("SOL"), None).total_points, 0);

        let stats = warehouse.stats();
        assert_eq!(stats.sources["coinglass"], 2);
        assert_eq!(stats.assets["ETH"], 1);

        warehouse.clear();
        assert!(warehouse.is_empty());
        assert!(warehouse.add(point("dune", "ETH", "total_eth_deposited", at(4, 0), 1.0)));
    }

    #[test]
    fn concurrent_inserts_do_not_duplicate() {
        let warehouse = Arc::new(Warehouse::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let warehouse = Arc::clone(&warehouse);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|hour| warehouse.add(point("x", "BTC", "m", at(1, hour % 24), 1.0)))
                        .filter(|added| *added)
                        .count()
                })
            })
            .collect();
        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 24);
        assert_eq!(warehouse.len(), 24);
    }
}
