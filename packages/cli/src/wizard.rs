//! Interactive setup for a new site.

use std::collections::BTreeMap;
use std::sync::Arc;

use console::style;
use data_fetch_compliance::RobotsStatus;
use data_fetch_source::archive::generate_site_id;
use data_fetch_source::setup::{self, SetupSource};
use data_fetch_source::universal::UniversalScraper;
use dialoguer::{Confirm, Input, Select};

use crate::Context;
use crate::commands::print_setup_complete;

/// Walks the user through picking a data source on `url` and saves the
/// resulting config. Returns `Ok(false)` if the user cancels.
///
/// # Errors
///
/// Returns an error if a prompt, discovery or the config store fails.
pub async fn run(ctx: &Context, url: &str, override_robots: bool) -> Result<bool, Box<dyn std::error::Error>> {
    println!("{}", style(format!("Setting up: {url}")).bold());

    println!("\nChecking robots.txt...");
    let decision = ctx.robots.check(url).await;
    println!("  Status: {}", decision.status);
    println!("  Reason: {}", decision.reason);

    let mut override_approved = false;
    match decision.status {
        RobotsStatus::Disallowed => {
            println!("{}", style("\n✗ Scraping this URL is not allowed").red());
            return Ok(false);
        }
        RobotsStatus::Unknown if !override_robots => {
            let proceed = Confirm::new()
                .with_prompt("robots.txt could not be evaluated. Proceed at your own risk?")
                .default(false)
                .interact()?;
            if !proceed {
                println!("{}", style("\n✗ Setup cancelled").red());
                return Ok(false);
            }
            override_approved = true;
        }
        RobotsStatus::Unknown => override_approved = true,
        RobotsStatus::Allowed => {}
    }

    println!("\nDiscovering data sources...");
    let scraper = UniversalScraper::new(Arc::clone(&ctx.loader), ctx.client.clone())
        .with_site_id(&generate_site_id(url, None))
        .with_load_options(ctx.load_options.clone());
    let discovery = scraper.discover_sources(url).await?;

    let sources = setup::list_sources(&discovery);
    if sources.is_empty() {
        println!("{}", style("\n✗ No data sources found on this page").red());
        return Ok(false);
    }

    let labels: Vec<String> = sources.iter().map(SetupSource::describe).collect();
    let idx = Select::new()
        .with_prompt("Which data source should be scraped?")
        .items(&labels)
        .default(0)
        .interact()?;
    let source = &sources[idx];

    let mappings = choose_mappings(source)?;
    let mut config = setup::generate_config(url, source, mappings, setup::policy_status(decision.status));
    config.robots_policy.override_approved = override_approved;

    config.id = Input::new()
        .with_prompt("Site id")
        .default(config.id.clone())
        .interact_text()?;
    config.name = Input::new()
        .with_prompt("Display name")
        .default(config.name.clone())
        .interact_text()?;

    let mut store = ctx.store()?;
    if store.get(&config.id).is_some()
        && !Confirm::new()
            .with_prompt(format!("Site '{}' already exists. Overwrite?", config.id))
            .default(false)
            .interact()?
    {
        println!("{}", style("\n✗ Setup cancelled").red());
        return Ok(false);
    }

    let config = setup::save_config(&mut store, config)?;
    print_setup_complete(&config.id);
    Ok(true)
}

/// Suggested mappings, confirmed one by one.
fn choose_mappings(source: &SetupSource) -> Result<BTreeMap<String, String>, dialoguer::Error> {
    let suggested = setup::suggest_field_mappings(source.field_names());
    if suggested.is_empty() {
        println!("  No field mappings suggested; raw field names will be kept.");
        return Ok(suggested);
    }

    println!("\nSuggested field mappings:");
    for (target, field) in &suggested {
        println!("  {target} <- {field}");
    }
    if Confirm::new()
        .with_prompt("Use these mappings?")
        .default(true)
        .interact()?
    {
        return Ok(suggested);
    }

    let mut chosen = BTreeMap::new();
    for (target, field) in suggested {
        if Confirm::new()
            .with_prompt(format!("Map '{field}' to '{target}'?"))
            .default(true)
            .interact()?
        {
            chosen.insert(target, field);
        }
    }
    Ok(chosen)
}
