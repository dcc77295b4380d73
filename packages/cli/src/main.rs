#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `data_fetch`: discover, configure, scrape and normalize financial data
//! from websites.
//!
//! Uses `indicatif-log-bridge` (via [`data_fetch_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod wizard;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use data_fetch_browser::chromium::ChromiumLoader;
use data_fetch_browser::{LoadOptions, PageLoader};
use data_fetch_cli_utils::MultiProgress;
use data_fetch_compliance::RobotsChecker;
use data_fetch_source::archive::OutputPaths;
use data_fetch_source::config_store::{ConfigStore, DEFAULT_CONFIG_PATH};
use data_fetch_source::http;

const USER_AGENT: &str = "DataFetchBot/1.0";

#[derive(Parser)]
#[command(
    name = "data_fetch",
    version,
    about = "Extract financial data from websites and export it to spreadsheets"
)]
struct Cli {
    /// Site configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Root directory for raw archives and spreadsheets
    #[arg(long, global = true, env = "DATA_FETCH_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
    /// Load pages without fingerprint randomisation
    #[arg(long, global = true)]
    no_stealth: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a configured site or an arbitrary URL
    Scrape {
        /// Site id from the configuration file
        #[arg(long, short, conflicts_with = "url", required_unless_present = "url")]
        site: Option<String>,
        /// URL to scrape with automatic discovery
        #[arg(long, short)]
        url: Option<String>,
        /// Spreadsheet path (defaults to `<output-dir>/excel/<site>_<time>.xlsx`)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Proceed when robots.txt cannot be evaluated
        #[arg(long)]
        override_robots: bool,
        /// Skip the spreadsheet export
        #[arg(long)]
        no_export: bool,
        /// Do not fall back to public market-data APIs when the site fails
        #[arg(long)]
        no_fallbacks: bool,
    },
    /// Discover a page's data sources and save a site configuration
    Setup {
        #[arg(long, short)]
        url: String,
        /// Pick the best endpoint without prompting
        #[arg(long)]
        non_interactive: bool,
        /// Proceed when robots.txt cannot be evaluated
        #[arg(long)]
        override_robots: bool,
    },
    /// List configured sites
    ListSites,
    /// Discover and extract from a URL without saving anything
    Test {
        #[arg(long, short)]
        url: String,
        /// Proceed when robots.txt cannot be evaluated
        #[arg(long)]
        override_robots: bool,
    },
    /// Check robots.txt permissions for a URL
    CheckRobots {
        #[arg(long, short)]
        url: String,
    },
    /// Scrape every site covering an asset and normalize the results
    Fetch {
        /// Asset symbol or name (e.g. BTC, ethereum)
        #[arg(long, short)]
        asset: String,
        /// Metric categories to show (volume, liquidations, ...); repeatable
        #[arg(long = "category", short)]
        categories: Vec<String>,
    },
}

/// Shared handles every command needs.
pub struct Context {
    pub config_path: PathBuf,
    pub output: OutputPaths,
    pub load_options: LoadOptions,
    pub loader: Arc<dyn PageLoader>,
    pub client: reqwest::Client,
    pub robots: Arc<RobotsChecker>,
    pub multi: MultiProgress,
}

impl Context {
    fn new(cli: &Cli, multi: MultiProgress) -> Result<Self, Box<dyn std::error::Error>> {
        let output = cli
            .output_dir
            .as_ref()
            .map_or_else(OutputPaths::from_env, OutputPaths::new);
        let load_options = LoadOptions {
            use_stealth: !cli.no_stealth,
            ..LoadOptions::default()
        };
        Ok(Self {
            config_path: cli.config.clone(),
            output,
            load_options,
            loader: Arc::new(ChromiumLoader::new()),
            client: http::client(USER_AGENT, http::DEFAULT_TIMEOUT)?,
            robots: Arc::new(RobotsChecker::new()?),
            multi,
        })
    }

    /// Opens the configuration file.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the file cannot be read or parsed.
    pub fn store(&self) -> Result<ConfigStore, data_fetch_source::SourceError> {
        let store = ConfigStore::open(&self.config_path)?;
        for rejected in store.rejected() {
            log::warn!("Skipped invalid site entry: {rejected}");
        }
        Ok(store)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let multi = data_fetch_cli_utils::init_logger(cli.debug);

    let ctx = match Context::new(&cli, multi) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{} {e}", console::style("Error:").red().bold());
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::Scrape {
            site,
            url,
            output,
            override_robots,
            no_export,
            no_fallbacks,
        } => {
            let flags = commands::ScrapeFlags {
                override_robots,
                export: !no_export,
                fallbacks: !no_fallbacks,
            };
            commands::scrape(&ctx, site.as_deref(), url.as_deref(), output.as_deref(), flags).await
        }
        Commands::Setup {
            url,
            non_interactive,
            override_robots,
        } => {
            if non_interactive {
                commands::setup_non_interactive(&ctx, &url, override_robots).await
            } else {
                wizard::run(&ctx, &url, override_robots).await
            }
        }
        Commands::ListSites => commands::list_sites(&ctx),
        Commands::Test {
            url,
            override_robots,
        } => commands::test(&ctx, &url, override_robots).await,
        Commands::CheckRobots { url } => commands::check_robots(&ctx, &url).await,
        Commands::Fetch { asset, categories } => commands::fetch(&ctx, &asset, &categories).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {e}", console::style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}
