//! Scrape, normalize, validate and store for one asset.

use std::collections::BTreeMap;
use std::sync::Arc;

use data_fetch_scraper::Table;
use data_fetch_source::batch::RealtimeScraper;
use data_fetch_source::progress::ProgressCallback;
use data_fetch_warehouse::Warehouse;

use crate::assets::AssetMapper;
use crate::category::metrics_for_categories;
use crate::validation::{NormalizationValidator, ValidationReport};
use crate::{Category, NormalizedDataPoint, normalize_tables, source_for_site};

const EMPTY_VIEW_WARNING: &str = "No normalized metrics matched the selected categories; \
     stored unfiltered points but returned an empty filtered view. Consider selecting \
     'volume' or 'trust', or update metric-category mappings.";

/// Everything one [`RealtimeNormalizer::fetch_and_normalize`] run produced.
#[derive(Debug, Default)]
pub struct NormalizationResult {
    pub success: bool,
    pub asset: String,
    pub categories: Vec<Category>,
    /// Raw tables keyed by site id.
    pub raw_data: BTreeMap<String, Table>,
    /// Points matching the selected categories. Every point is stored
    /// regardless.
    pub normalized_points: Vec<NormalizedDataPoint>,
    /// Keyed by source name.
    pub validation_reports: BTreeMap<String, ValidationReport>,
    pub points_added: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sources_scraped: Vec<String>,
    pub sources_failed: Vec<String>,
}

impl NormalizationResult {
    fn failed(asset: &str, categories: &[Category], error: String) -> Self {
        Self {
            asset: asset.to_owned(),
            categories: categories.to_vec(),
            errors: vec![error],
            ..Self::default()
        }
    }
}

pub struct RealtimeNormalizer {
    scraper: RealtimeScraper,
    mapper: AssetMapper,
    validator: NormalizationValidator,
    warehouse: Arc<Warehouse>,
}

impl RealtimeNormalizer {
    /// Routes assets over the scraper's configured sites. Validation runs
    /// the basic checks only until [`Self::with_validator`] says otherwise.
    #[must_use]
    pub fn new(scraper: RealtimeScraper, warehouse: Arc<Warehouse>) -> Self {
        let mapper = AssetMapper::new(scraper.sites());
        Self {
            scraper,
            mapper,
            validator: NormalizationValidator::new(),
            warehouse,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: NormalizationValidator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub const fn mapper(&self) -> &AssetMapper {
        &self.mapper
    }

    #[must_use]
    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    /// Scrapes every site covering `asset`, normalizes what came back,
    /// validates each source and stores all points.
    ///
    /// `categories` only narrows the returned view; stored points are
    /// never filtered. An empty list selects everything.
    pub async fn fetch_and_normalize(
        &self,
        asset: &str,
        categories: &[Category],
        progress: &dyn ProgressCallback,
    ) -> NormalizationResult {
        log::info!("Starting normalization for asset: {asset}, categories: {categories:?}");

        let site_ids = self.mapper.sites_for_asset(asset);
        if site_ids.is_empty() {
            log::warn!("No sites found for asset: {asset}");
        }
        let outcome = self.scraper.scrape_sites(&site_ids, progress).await;

        if outcome.tables.is_empty() {
            let mut result =
                NormalizationResult::failed(asset, categories, format!("No data scraped for asset: {asset}"));
            result.sources_failed = outcome.failures.into_keys().collect();
            return result;
        }

        let mut result = NormalizationResult {
            asset: asset.to_owned(),
            categories: categories.to_vec(),
            sources_scraped: outcome.tables.keys().cloned().collect(),
            sources_failed: outcome.failures.keys().cloned().collect(),
            ..NormalizationResult::default()
        };
        log::info!(
            "Scraped {} sources: {:?}",
            result.sources_scraped.len(),
            result.sources_scraped
        );

        let batch = normalize_tables(&outcome.tables);
        result.warnings.extend(batch.skipped);
        result.raw_data = outcome.tables;

        if batch.points.is_empty() {
            result.errors.push("No normalized data points created".to_owned());
            return result;
        }
        log::info!("Created {} normalized data points", batch.points.len());

        result.validation_reports = self.validate(&result.raw_data, &batch.points).await;
        for (source, report) in &result.validation_reports {
            if !report.passed {
                result
                    .errors
                    .extend(report.errors.iter().map(|e| format!("{source}: {e}")));
            }
            result
                .warnings
                .extend(report.warnings.iter().map(|w| format!("{source}: {w}")));
        }

        result.normalized_points = if categories.is_empty() {
            batch.points.clone()
        } else {
            let wanted = metrics_for_categories(categories, Some(asset));
            let view: Vec<NormalizedDataPoint> = batch
                .points
                .iter()
                .filter(|p| wanted.contains(&p.metric))
                .cloned()
                .collect();
            if view.len() < batch.points.len() {
                log::info!(
                    "Filtered {} points to {} based on categories: {categories:?}",
                    batch.points.len(),
                    view.len()
                );
            }
            if view.is_empty() {
                result.warnings.push(EMPTY_VIEW_WARNING.to_owned());
            }
            view
        };

        result.points_added = self.warehouse.add_many(batch.points);
        result.success = true;
        log::info!(
            "Successfully normalized and stored {} data points",
            result.points_added
        );
        result
    }

    async fn validate(
        &self,
        raw_data: &BTreeMap<String, Table>,
        points: &[NormalizedDataPoint],
    ) -> BTreeMap<String, ValidationReport> {
        let mut by_source: BTreeMap<&str, Vec<NormalizedDataPoint>> = BTreeMap::new();
        for point in points {
            by_source
                .entry(point.source.as_str())
                .or_default()
                .push(point.clone());
        }

        let mut reports = BTreeMap::new();
        for (site_id, table) in raw_data {
            let source = source_for_site(site_id);
            let Some(source_points) = by_source.get(source.as_str()) else {
                continue;
            };
            let report = self.validator.validate(table, source_points, &source).await;
            reports.insert(source, report);
        }
        reports
    }
}
