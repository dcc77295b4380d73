//! Routes asset names to the configured sites that carry data for them.
//!
//! Routing is keyword based on site id and name, so a new site is picked
//! up without extra configuration as long as its id says what it covers.

use std::collections::{BTreeMap, BTreeSet};

use data_fetch_source::SiteConfig;
use serde::Serialize;

/// Normalized asset name and its lowercase aliases.
pub const ASSET_ALIASES: &[(&str, &[&str])] = &[
    ("BTC", &["bitcoin", "btc"]),
    ("ETH", &["ethereum", "eth"]),
    ("SOL", &["solana", "sol"]),
    ("ALL", &["all", "aggregate", "combined"]),
    ("EXCHANGES", &["exchanges", "exchange"]),
];

/// An asset and the sites that cover it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub asset: String,
    pub original_input: String,
    pub site_count: usize,
    pub sites: Vec<String>,
}

/// Asset to site-id routing table.
#[derive(Debug, Clone, Default)]
pub struct AssetMapper {
    sites_by_asset: BTreeMap<String, BTreeSet<String>>,
}

impl AssetMapper {
    /// Builds the routing table from configured sites.
    #[must_use]
    pub fn new(sites: &[SiteConfig]) -> Self {
        let mut mapper = Self::default();
        for site in sites {
            mapper.route(&site.id, &site.name);
        }
        log::debug!(
            "Built asset mapping: {} assets mapped to sites",
            mapper.sites_by_asset.len()
        );
        mapper
    }

    fn add(&mut self, asset: &str, site_id: &str) {
        self.sites_by_asset
            .entry(asset.to_owned())
            .or_default()
            .insert(site_id.to_owned());
    }

    fn route(&mut self, site_id: &str, name: &str) {
        let id = site_id.to_lowercase();
        let name = name.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| id.contains(w) || name.contains(w));
        let id_has = |word: &str| id.contains(word);

        let mut assets: Vec<&str> = Vec::new();
        if mentions(&["btc", "bitcoin"]) {
            assets.push("BTC");
        }
        if mentions(&["eth", "ethereum", "staking"]) {
            assets.push("ETH");
        }
        if mentions(&["sol", "solana"]) {
            assets.push("SOL");
        }
        if mentions(&["exchange_volume", "total", "combined", "all"]) {
            assets.push("ALL");
        }

        if id_has("coingecko") {
            if id_has("btc") || id_has("bitcoin") {
                assets.push("BTC");
            } else if id_has("exchange") {
                assets.extend(["ALL", "BTC"]);
            } else {
                assets.push("ALL");
            }
        }
        if id_has("coinglass") {
            assets.extend(["BTC", "ALL"]);
        }
        if id_has("theblock") {
            if id_has("btc") || id_has("eth") {
                if id_has("btc") {
                    assets.push("BTC");
                }
                if id_has("eth") {
                    assets.push("ETH");
                }
                if id_has("btc") && id_has("eth") {
                    assets.push("ALL");
                }
            } else if id_has("exchange") || id_has("total") {
                assets.extend(["ALL", "BTC", "ETH"]);
                if id_has("sol") {
                    assets.push("SOL");
                }
            }
        }
        if id_has("dune") {
            if id_has("eth") || id_has("staking") {
                assets.push("ETH");
            } else {
                assets.push("ALL");
            }
        }

        for asset in assets {
            self.add(asset, site_id);
        }
    }

    /// Canonical name for user input such as `bitcoin` or ` btc `.
    #[must_use]
    pub fn normalize_asset_name(asset: &str) -> String {
        let trimmed = asset.trim();
        let lower = trimmed.to_lowercase();
        ASSET_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&lower.as_str()))
            .map_or_else(|| trimmed.to_uppercase(), |(name, _)| (*name).to_owned())
    }

    /// Sorted site ids for an asset.
    ///
    /// An asset with no routes falls back to the first asset whose name
    /// contains it or is contained by it.
    #[must_use]
    pub fn sites_for_asset(&self, asset: &str) -> Vec<String> {
        let normalized = Self::normalize_asset_name(asset);
        if let Some(sites) = self.sites_by_asset.get(&normalized) {
            return sites.iter().cloned().collect();
        }

        log::warn!("Asset '{asset}' (normalized: '{normalized}') not found in mapping");
        let lower = normalized.to_lowercase();
        self.sites_by_asset
            .iter()
            .find(|(known, _)| {
                let known = known.to_lowercase();
                known.contains(&lower) || lower.contains(&known)
            })
            .map(|(known, sites)| {
                log::info!("Found partial match: '{asset}' -> '{known}'");
                sites.iter().cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Assets with at least one site, sorted.
    #[must_use]
    pub fn available_assets(&self) -> Vec<String> {
        self.sites_by_asset.keys().cloned().collect()
    }

    #[must_use]
    pub fn asset_info(&self, asset: &str) -> AssetInfo {
        let sites = self.sites_for_asset(asset);
        AssetInfo {
            asset: Self::normalize_asset_name(asset),
            original_input: asset.to_owned(),
            site_count: sites.len(),
            sites,
        }
    }
}

#[cfg(test)]
mod tests {
    use data_fetch_source::ExtractionStrategy;
    use data_fetch_source_models::DataSource;

    use super::*;

    fn site(id: &str) -> SiteConfig {
        SiteConfig::new(
            id,
            "https://example.com",
            "https://example.com/data",
            ExtractionStrategy::ApiJson,
            DataSource::api("https://example.com/api"),
        )
    }

    fn mapper() -> AssetMapper {
        AssetMapper::new(&[
            site("coinglass_overview"),
            site("coingecko_exchanges"),
            site("theblock_btc_eth_volume"),
            site("theblock_exchange_volume"),
            site("dune_eth_staking"),
            site("dune_dex_trades"),
            site("solana_fm_stats"),
        ])
    }

    #[test]
    fn normalizes_aliases() {
        assert_eq!(AssetMapper::normalize_asset_name(" Bitcoin "), "BTC");
        assert_eq!(AssetMapper::normalize_asset_name("eth"), "ETH");
        assert_eq!(AssetMapper::normalize_asset_name("aggregate"), "ALL");
        assert_eq!(AssetMapper::normalize_asset_name("Exchange"), "EXCHANGES");
        assert_eq!(AssetMapper::normalize_asset_name("doge"), "DOGE");
    }

    #[test]
    fn routes_sites_by_keyword() {
        let mapper = mapper();
        assert_eq!(
            mapper.sites_for_asset("bitcoin"),
            vec![
                "coingecko_exchanges",
                "coinglass_overview",
                "theblock_btc_eth_volume",
                "theblock_exchange_volume",
            ]
        );
        assert_eq!(
            mapper.sites_for_asset("ETH"),
            vec!["dune_eth_staking", "theblock_btc_eth_volume", "theblock_exchange_volume"]
        );
        assert_eq!(mapper.sites_for_asset("sol"), vec!["solana_fm_stats"]);
        assert!(mapper.sites_for_asset("ALL").contains(&"dune_dex_trades".to_owned()));
        assert_eq!(mapper.available_assets(), vec!["ALL", "BTC", "ETH", "SOL"]);
    }

    #[test]
    fn unknown_asset_uses_partial_match() {
        let mapper = mapper();
        let info = mapper.asset_info("BTCUSD");
        assert_eq!(info.asset, "BTCUSD");
        assert_eq!(info.site_count, 4);
        assert!(mapper.sites_for_asset("doge").is_empty());
    }
}
