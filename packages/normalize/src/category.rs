//! Metric families and the metric names that belong to each.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::Serialize;
use strum::IntoEnumIterator;

use crate::Category;

/// Metric names per category.
const CATEGORY_METRICS: &[(Category, &[&str])] = &[
    (
        Category::Volume,
        &[
            "spot_volume_24h",
            "futures_volume_24h",
            "volume_7dma",
            "exchange_volume_24h_total",
            "btc_volume_7dma",
            "eth_volume_7dma",
            "sol_volume",
        ],
    ),
    (
        Category::Liquidations,
        &[
            "liquidations_24h_total",
            "liquidations_24h_long",
            "liquidations_24h_short",
            "liquidations_24h",
        ],
    ),
    (
        Category::Derivatives,
        &[
            "open_interest",
            "futures_oi_all_exchanges",
            "futures_oi",
            "options_oi",
            "cme_btc_oi",
            "binance_btc_oi",
            "btc_options_calls_oi",
            "btc_options_puts_oi",
        ],
    ),
    (
        Category::Flows,
        &[
            "net_inflow_24h",
            "net_inflow_5min",
            "net_inflow_1h",
            "net_inflow_4h",
            "net_inflow_12h",
            "spot_inflow",
            "spot_outflow",
        ],
    ),
    (Category::Market, &["btc_price", "eth_price", "sol_price", "market_cap", "price"]),
    (Category::Trust, &["avg_trust_score", "trust_score", "trust_rank"]),
    (
        Category::Staking,
        &[
            "total_eth_deposited",
            "total_validators",
            "distinct_depositor_addresses",
            "staking_deposits",
            "validators",
        ],
    ),
];

/// `(asset, include, exclude)`. `ALL` keeps everything.
const ASSET_METRICS: &[(&str, &[&str], &[&str])] = &[
    (
        "BTC",
        &[
            "btc_price",
            "btc_volume_7dma",
            "btc_liquidations_24h",
            "cme_btc_oi",
            "binance_btc_oi",
            "btc_options_calls_oi",
            "btc_options_puts_oi",
        ],
        &["eth_price", "total_eth_deposited", "total_validators"],
    ),
    (
        "ETH",
        &[
            "eth_price",
            "eth_volume_7dma",
            "eth_liquidations_24h",
            "total_eth_deposited",
            "total_validators",
            "distinct_depositor_addresses",
        ],
        &["btc_price", "btc_volume_7dma", "btc_liquidations_24h"],
    ),
    ("SOL", &["sol_price", "sol_volume"], &["btc_price", "eth_price", "total_eth_deposited"]),
    ("ALL", &[], &[]),
];

/// Prefixes of metrics that apply to any asset.
const GENERAL_PREFIXES: [&str; 6] = ["spot_", "futures_", "total_", "net_", "open_", "exchange_"];

/// Every category, in declaration order.
#[must_use]
pub fn available_categories() -> Vec<Category> {
    Category::iter().collect()
}

/// Human-readable description of a category.
#[must_use]
pub const fn description(category: Category) -> &'static str {
    match category {
        Category::Volume => "Trading volume metrics (spot, futures, exchange volumes)",
        Category::Liquidations => "Liquidation metrics (total, long, short, per-asset)",
        Category::Derivatives => "Derivatives metrics (open interest, futures, options)",
        Category::Flows => "Flow metrics (inflows, outflows, net flows)",
        Category::Market => "Market data (prices, market caps)",
        Category::Trust => "Trust and reputation metrics",
        Category::Staking => "Staking metrics (ETH staking, validators, deposits)",
    }
}

fn metrics_of(category: Category) -> &'static [&'static str] {
    CATEGORY_METRICS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, metrics)| *metrics)
        .unwrap_or_default()
}

/// Parses category names, returning the recognised categories and the
/// names that matched none.
#[must_use]
pub fn parse_categories(names: &[String]) -> (Vec<Category>, Vec<String>) {
    let mut known = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        match Category::from_str(name.trim()) {
            Ok(category) => known.push(category),
            Err(_) => {
                log::warn!("Unknown category: {name}");
                unknown.push(name.clone());
            }
        }
    }
    (known, unknown)
}

/// Sorted metric names covered by `categories`, narrowed for `asset`.
///
/// Known assets add their asset-specific metrics that fall in one of the
/// selected categories and drop metrics that belong to other assets.
/// Unknown assets keep metrics naming the asset plus general metrics.
#[must_use]
pub fn metrics_for_categories(categories: &[Category], asset: Option<&str>) -> Vec<String> {
    let mut metrics: BTreeSet<&str> = categories
        .iter()
        .flat_map(|c| metrics_of(*c).iter().copied())
        .collect();

    if let Some(asset) = asset {
        let upper = asset.trim().to_uppercase();
        match ASSET_METRICS.iter().find(|(a, _, _)| *a == upper) {
            Some((_, include, exclude)) => {
                metrics.extend(include.iter().copied().filter(|m| {
                    category_for_metric(m).is_some_and(|c| categories.contains(&c))
                }));
                metrics.retain(|m| !exclude.contains(m));
            }
            None => {
                let lower = upper.to_lowercase();
                metrics.retain(|m| {
                    m.to_lowercase().contains(&lower)
                        || GENERAL_PREFIXES.iter().any(|p| m.starts_with(p))
                });
            }
        }
    }

    metrics.into_iter().map(str::to_owned).collect()
}

/// Category of a metric: exact table match first, then name keywords.
#[must_use]
pub fn category_for_metric(metric: &str) -> Option<Category> {
    let lower = metric.to_lowercase();
    if let Some((category, _)) = CATEGORY_METRICS
        .iter()
        .find(|(_, metrics)| metrics.iter().any(|m| *m == lower))
    {
        return Some(*category);
    }

    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["volume"]) {
        Some(Category::Volume)
    } else if has(&["liquidation"]) {
        Some(Category::Liquidations)
    } else if has(&["interest", "oi", "options"]) {
        Some(Category::Derivatives)
    } else if has(&["flow", "inflow", "outflow"]) {
        Some(Category::Flows)
    } else if has(&["price", "market_cap"]) {
        Some(Category::Market)
    } else if has(&["trust"]) {
        Some(Category::Trust)
    } else if has(&["staking", "stake", "validator", "deposit"]) {
        Some(Category::Staking)
    } else {
        None
    }
}

/// Metrics selected for a query, grouped by category.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsInfo {
    pub categories: Vec<Category>,
    pub asset: Option<String>,
    pub total_metrics: usize,
    pub metrics: Vec<String>,
    /// Keyed by category name; uncategorised metrics go under `other`.
    pub metrics_by_category: BTreeMap<String, Vec<String>>,
}

#[must_use]
pub fn metrics_info(categories: &[Category], asset: Option<&str>) -> MetricsInfo {
    let metrics = metrics_for_categories(categories, asset);
    let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for metric in &metrics {
        let key = category_for_metric(metric).map_or_else(|| "other".to_owned(), |c| c.to_string());
        by_category.entry(key).or_default().push(metric.clone());
    }
    MetricsInfo {
        categories: categories.to_vec(),
        asset: asset.map(str::to_owned),
        total_metrics: metrics.len(),
        metrics,
        metrics_by_category: by_category,
    }
}
