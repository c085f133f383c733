//! cdp-crawler - Main entry point
//!
//! Crawls every configured site from its seed device and writes the
//! resulting topology report.

mod config;

use anyhow::{bail, Context, Result};
use cdpcrawl_core::CrawlReport;
use cdpcrawl_discovery::{CrawlContext, HickoryNameResolver, TopologyCrawler};
use cdpcrawl_ssh::{Credentials, SshConnector};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const USERNAME_ENV: &str = "CDP_SSH_USERNAME";
const PASSWORD_ENV: &str = "CDP_SSH_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "cdp-crawler")]
#[command(about = "CDP topology crawler for switched and wireless networks")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cdp-crawler.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// SSH user name (overrides CDP_SSH_USERNAME)
    #[arg(short, long)]
    username: Option<String>,

    /// Only crawl the named site (repeatable)
    #[arg(short, long = "site")]
    sites: Vec<String>,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a sample configuration to --config and exit
    #[arg(long)]
    print_default_config: bool,
}

fn credentials(username: Option<String>) -> Result<Credentials> {
    let username = match username {
        Some(username) => username,
        None => std::env::var(USERNAME_ENV)
            .with_context(|| format!("no user name given and {} is not set", USERNAME_ENV))?,
    };
    let password = std::env::var(PASSWORD_ENV)
        .with_context(|| format!("{} is not set", PASSWORD_ENV))?;

    if username.is_empty() || password.is_empty() {
        bail!("SSH credentials must not be empty");
    }
    Ok(Credentials::new(username, password))
}

fn write_report(report: &CrawlReport, output: Option<&Path>) -> Result<()> {
    let json = report.to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("cdp-crawler v{}", env!("CARGO_PKG_VERSION"));

    if args.print_default_config {
        config::save_default_config(&args.config)?;
        println!("Wrote sample configuration to {}", args.config.display());
        return Ok(());
    }

    let config = config::load_config(&args.config)?;
    config.validate()?;
    let sites = config.selected_sites(&args.sites)?;
    if sites.is_empty() {
        bail!("no sites to crawl");
    }

    let credentials = credentials(args.username)?;

    info!(
        sites = sites.len(),
        default_depth = config.crawl.default_scan_depth,
        check_host = %config.crawl.credential_check_host,
        "Configuration loaded"
    );

    let connector = Arc::new(SshConnector::new(config.ssh_options()));
    let resolver = Arc::new(HickoryNameResolver::new(&config.dns)?);
    let context = CrawlContext::new(credentials, config.to_crawler_config());
    let crawler = TopologyCrawler::new(connector, resolver, context);

    let report = crawler.run(&sites).await?;

    for summary in report.summaries() {
        eprintln!(
            "  - {}: {} devices, {} APs, {} failed",
            summary.site, summary.devices, summary.access_points, summary.failed
        );
    }
    if !report.unfound_aps.is_empty() {
        eprintln!("  APs without serial: {}", report.unfound_aps.join(", "));
    }

    write_report(&report, args.output.as_deref())
}
