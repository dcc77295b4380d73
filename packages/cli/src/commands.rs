//! Non-interactive subcommands.
//!
//! Each returns `Ok(true)` on success, `Ok(false)` after printing a
//! failure, and `Err` for errors that stop the command outright.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use data_fetch_cli_utils::IndicatifProgress;
use data_fetch_compliance::{RobotsDecision, RobotsStatus};
use data_fetch_normalize::category::parse_categories;
use data_fetch_normalize::realtime::RealtimeNormalizer;
use data_fetch_normalize::validation::NormalizationValidator;
use data_fetch_scraper::Table;
use data_fetch_source::archive::generate_site_id;
use data_fetch_source::batch::RealtimeScraper;
use data_fetch_source::configured::ConfiguredScraper;
use data_fetch_source::fallback::{DEFAULT_FALLBACK_SITES, FallbackChain};
use data_fetch_source::universal::UniversalScraper;
use data_fetch_source::{ScrapeOptions, ScraperResult, run_scrape, setup};
use data_fetch_warehouse::Warehouse;

use crate::Context;

type CommandResult = Result<bool, Box<dyn std::error::Error>>;

const PREVIEW_ROWS: usize = 3;

fn universal(ctx: &Context, url: &str) -> UniversalScraper {
    UniversalScraper::new(Arc::clone(&ctx.loader), ctx.client.clone())
        .with_site_id(&generate_site_id(url, None))
        .with_load_options(ctx.load_options.clone())
}

fn options(ctx: &Context, override_robots: bool) -> ScrapeOptions {
    ScrapeOptions::default()
        .with_output(ctx.output.clone())
        .with_override_robots(override_robots)
}

/// Switches for [`scrape`].
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_excessive_bools)]
pub struct ScrapeFlags {
    pub override_robots: bool,
    pub export: bool,
    /// Try the public market-data APIs when a configured site fails.
    pub fallbacks: bool,
}

pub async fn scrape(
    ctx: &Context,
    site: Option<&str>,
    url: Option<&str>,
    output: Option<&Path>,
    flags: ScrapeFlags,
) -> CommandResult {
    println!("Starting scrape...");
    let override_robots = flags.override_robots;

    let result = match (site, url) {
        (Some(site_id), _) => {
            let mut store = ctx.store()?;
            let Some(config) = store.get(site_id).cloned() else {
                return Err(format!("Site '{site_id}' not found in config").into());
            };
            let override_robots = override_robots || config.robots_policy.override_approved;
            let scraper = ConfiguredScraper::new(config, Arc::clone(&ctx.loader), ctx.client.clone())
                .with_load_options(ctx.load_options.clone());
            let fallbacks: &[&str] = if flags.fallbacks { DEFAULT_FALLBACK_SITES } else { &[] };
            let chain = FallbackChain::from_site_ids(fallbacks, store.sites(), &ctx.client);
            let result = chain
                .scrape(&scraper, None, &ctx.robots, &options(ctx, override_robots))
                .await;
            if result.success && result.source == site_id {
                store.record_success(site_id)?;
            }
            result
        }
        (None, Some(url)) => {
            let scraper = universal(ctx, url);
            run_scrape(&scraper, Some(url), &ctx.robots, &options(ctx, override_robots)).await
        }
        (None, None) => return Err("Either --site or --url must be provided".into()),
    };

    if !result.success {
        println!("{}", style("✗ Scrape failed!").red().bold());
        println!("  Error: {}", result.error.as_deref().unwrap_or("unknown error"));
        return Ok(false);
    }

    let exported = match (&result.data, flags.export) {
        (Some(table), true) => Some(export_result(ctx, &result.source, table, output)?),
        _ => None,
    };
    print_success(&result, exported.as_deref());
    Ok(true)
}

fn export_result(
    ctx: &Context,
    site_id: &str,
    table: &Table,
    output: Option<&Path>,
) -> Result<PathBuf, data_fetch_export::ExportError> {
    if let Some(path) = output {
        data_fetch_export::export_table(table, path, site_id)?;
        return Ok(path.to_path_buf());
    }
    let mut sheets = BTreeMap::new();
    sheets.insert(site_id.to_owned(), table.clone());
    data_fetch_export::export_sheets(&sheets, &ctx.output.excel_dir(), site_id)
}

fn print_success(result: &ScraperResult, exported: Option<&Path>) {
    println!("{}", style("✓ Scrape successful!").green().bold());
    println!("  Source: {}", result.source);
    if let Some(tried) = result.metadata.get("fallback_sources_tried").and_then(|v| v.as_array()) {
        println!("  Fallback used after {} failed source(s)", tried.len());
    }
    println!("  Rows extracted: {}", result.rows_extracted);
    if let Some((first, last)) = result.date_range {
        println!("  Date range: {first} to {last}");
    }
    if !result.validation_warnings.is_empty() {
        println!("  Warnings: {}", result.validation_warnings.len());
        for warning in &result.validation_warnings {
            println!("    - {warning}");
        }
    }
    if let Some(path) = &result.raw_response_path {
        println!("  Raw response: {}", path.display());
    }
    if let Some(path) = exported {
        println!("  Output: {}", path.display());
    }
}

pub async fn setup_non_interactive(ctx: &Context, url: &str, override_robots: bool) -> CommandResult {
    let mut store = ctx.store()?;
    let scraper = universal(ctx, url);
    match setup::setup_non_interactive(&scraper, &ctx.robots, &mut store, url, override_robots).await {
        Ok(config) => {
            print_setup_complete(&config.id);
            Ok(true)
        }
        Err(e) => {
            println!("{}", style("\n✗ Setup failed or cancelled").red());
            println!("  {e}");
            Ok(false)
        }
    }
}

pub fn print_setup_complete(site_id: &str) {
    println!("{}", style("\n✓ Setup complete!").green().bold());
    println!("  Site ID: {site_id}");
    println!("\nYou can now scrape with:");
    println!("  data_fetch scrape --site {site_id}");
}

pub fn list_sites(ctx: &Context) -> CommandResult {
    let store = ctx.store()?;
    let sites = store.list();
    if sites.is_empty() {
        println!("No sites configured yet.");
        println!("\nAdd a site with:");
        println!("  data_fetch setup --url <website_url>");
        return Ok(true);
    }

    println!("Configured sites ({}):\n", sites.len());
    for site in &sites {
        println!("  {}", style(&site.id).cyan().bold());
        println!("    Name:     {}", site.name);
        println!("    URL:      {}", site.page_url);
        println!("    Strategy: {}", site.extraction_strategy);
        println!();
    }
    Ok(true)
}

fn styled_status(status: RobotsStatus) -> console::StyledObject<String> {
    let text = style(status.to_string());
    match status {
        RobotsStatus::Allowed => text.green(),
        RobotsStatus::Disallowed => text.red(),
        RobotsStatus::Unknown => text.yellow(),
    }
}

fn print_decision(decision: &RobotsDecision) {
    println!("  Status: {}", styled_status(decision.status).bold());
    println!("  Reason: {}", decision.reason);
}

pub async fn test(ctx: &Context, url: &str, override_robots: bool) -> CommandResult {
    println!("Testing: {url}\n");
    println!("Checking robots.txt...");
    let decision = ctx.robots.check(url).await;
    print_decision(&decision);

    if decision.is_disallowed() {
        println!("{}", style("\n✗ Cannot proceed - scraping is disallowed").red());
        return Ok(false);
    }
    if decision.is_unknown() && !override_robots {
        println!(
            "{}",
            style("\n⚠ Use --override-robots to proceed with UNKNOWN status").yellow()
        );
        return Ok(false);
    }

    println!("\nDiscovering data sources...");
    let scraper = universal(ctx, url);
    let discovery = scraper.discover_sources(url).await?;
    println!(
        "  Network responses captured: {}",
        discovery.page.network_responses.len()
    );
    println!("  Candidate endpoints: {}", discovery.candidates.len());
    if !discovery.candidates.is_empty() {
        println!("\n  Top candidates:");
        for (i, endpoint) in discovery.candidates.iter().take(3).enumerate() {
            let short: String = endpoint.url.chars().take(60).collect();
            println!("    {}. {short}...", i + 1);
            println!("       Type: {}", endpoint.content_type);
            println!("       Confidence: {:.2}", endpoint.confidence);
            if !endpoint.field_names.is_empty() {
                let fields: Vec<&str> = endpoint.field_names.iter().take(5).map(String::as_str).collect();
                println!("       Fields: {}", fields.join(", "));
            }
        }
    }

    println!("\nTesting extraction...");
    let options = options(ctx, true).with_save_raw(false);
    let result = run_scrape(&scraper, Some(url), &ctx.robots, &options).await;
    match result.data.filter(|_| result.success) {
        Some(table) => {
            println!("{}", style(format!("\n✓ Extracted {} rows", table.len())).green());
            println!("  Columns: {}", table.columns().join(", "));
            println!("\n  Sample (first {PREVIEW_ROWS} rows):");
            print_table(&table.head(PREVIEW_ROWS));
            Ok(true)
        }
        None => {
            println!(
                "{}",
                style(format!(
                    "\n✗ Extraction failed: {}",
                    result.error.as_deref().unwrap_or("no data")
                ))
                .red()
            );
            Ok(false)
        }
    }
}

fn print_table(table: &Table) {
    println!("    {}", table.columns().join("\t"));
    for row in table.rows() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("    {}", cells.join("\t"));
    }
}

pub async fn check_robots(ctx: &Context, url: &str) -> CommandResult {
    println!("Checking robots.txt for: {url}\n");
    let decision = ctx.robots.check(url).await;

    println!("Status: {}", styled_status(decision.status).bold());
    println!("Reason: {}", decision.reason);
    if let Some(robots_url) = &decision.robots_url {
        println!("Robots URL: {robots_url}");
    }

    match decision.status {
        RobotsStatus::Allowed => println!("{}", style("\n✓ You can scrape this URL").green()),
        RobotsStatus::Disallowed => {
            println!("{}", style("\n✗ Scraping this URL is not allowed").red());
        }
        RobotsStatus::Unknown => println!(
            "{}",
            style("\n⚠ Could not determine permissions - use with caution").yellow()
        ),
    }
    Ok(true)
}

pub async fn fetch(ctx: &Context, asset: &str, category_names: &[String]) -> CommandResult {
    let (categories, unknown) = parse_categories(category_names);
    for name in &unknown {
        println!("{}", style(format!("⚠ Unknown category ignored: {name}")).yellow());
    }

    let store = ctx.store()?;
    let scraper = RealtimeScraper::new(
        store.sites().to_vec(),
        Arc::clone(&ctx.loader),
        ctx.client.clone(),
        Arc::clone(&ctx.robots),
        options(ctx, false),
    )
    .with_load_options(ctx.load_options.clone());
    let normalizer = RealtimeNormalizer::new(scraper, Arc::new(Warehouse::new()))
        .with_validator(NormalizationValidator::from_env());

    let progress = IndicatifProgress::sites_bar(&ctx.multi, &format!("Fetching {asset}"));
    let result = normalizer
        .fetch_and_normalize(asset, &categories, progress.as_ref())
        .await;

    for warning in &result.warnings {
        println!("{}", style(format!("⚠ {warning}")).yellow());
    }
    if !result.sources_failed.is_empty() {
        println!("  Sources failed: {}", result.sources_failed.join(", "));
    }
    if !result.success {
        println!("{}", style("✗ Normalization failed").red().bold());
        for error in &result.errors {
            println!("  Error: {error}");
        }
        return Ok(false);
    }
    for error in &result.errors {
        println!("{}", style(format!("✗ {error}")).red());
    }

    println!("{}", style(format!("✓ Normalized {asset}")).green().bold());
    println!("  Sources scraped: {}", result.sources_scraped.join(", "));
    println!("  Points stored: {}", result.points_added);
    println!("\n  {:<32} {:<6} {:>20} {:<6} {:<10} TIMESTAMP", "METRIC", "ASSET", "VALUE", "UNIT", "SOURCE");
    for point in &result.normalized_points {
        println!(
            "  {:<32} {:<6} {:>20.4} {:<6} {:<10} {}",
            point.metric, point.asset, point.value, point.unit, point.source, point.timestamp
        );
    }
    Ok(true)
}
