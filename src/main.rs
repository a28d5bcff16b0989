// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gridfetch::orchestrator::{self, RunOptions};
use gridfetch::pool::DEFAULT_WORKERS;
use gridfetch::reports;
use gridfetch::{Criteria, SearchClient};

/// gridfetch - search-driven bulk downloader for federated data indexes.
#[derive(Parser)]
#[command(name = "gridfetch")]
#[command(version)]
#[command(about = "Search-driven bulk downloader for federated data indexes")]
#[command(long_about = "gridfetch - search-driven bulk downloader\n\n\
    Count matching files:   gridfetch --config criteria.json --count\n\
    Download them:          gridfetch --config criteria.json --out.dir ./data -y\n\
    List transfer URLs:     gridfetch --config criteria.json --urls.only\n\
    Explore the index:      gridfetch --config criteria.json --field.keys\n\n\
    The config file provides the search endpoint, field filters, and an\n\
    optional ordered data-node preference list.")]
struct Cli {
    /// Path to the JSON config file with the search criteria
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory to put downloads in (must already exist)
    #[arg(long = "out.dir", value_name = "PATH", default_value = ".")]
    out_dir: PathBuf,

    /// Display the available values for a field within the result set
    #[arg(long = "values.for", value_name = "FIELD")]
    values_for: Option<String>,

    /// Max number of concurrent downloads
    #[arg(short = 'p', value_name = "N", default_value_t = DEFAULT_WORKERS)]
    parallel: usize,

    /// Perform no downloads, only log what would happen
    #[arg(long = "no.download")]
    no_download: bool,

    /// Verbose output
    #[arg(long)]
    verbose: bool,

    /// Confirm larger downloads
    #[arg(short = 'y')]
    confirm: bool,

    /// Skip checksum verification
    #[arg(long = "no.verify")]
    no_verify: bool,

    /// Output possible field keys (the list may be incomplete)
    #[arg(long = "field.keys")]
    field_keys: bool,

    /// Output the data nodes that serve the matching files
    #[arg(long = "data.nodes")]
    data_nodes: bool,

    /// Only count the files that would be downloaded
    #[arg(long)]
    count: bool,

    /// Only output the HTTP URLs that would be used
    #[arg(long = "urls.only")]
    urls_only: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {:#}", "[✗]".red(), err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(config_path) = cli.config.clone() else {
        // Without criteria there is nothing to search or download.
        Cli::command().print_help()?;
        return Ok(());
    };

    let criteria = load_criteria(&config_path)?;
    if !cli.out_dir.is_dir() {
        bail!("directory {} does not exist", cli.out_dir.display());
    }
    debug!("criteria:\n{}", criteria);

    let client = SearchClient::new();
    if cli.data_nodes {
        reports::data_nodes(&client, &criteria)
    } else if let Some(field) = cli.values_for.as_deref() {
        reports::values_for(&client, &criteria, field)
    } else if cli.field_keys {
        reports::field_keys(&client, &criteria)
    } else {
        orchestrator::run(
            &client,
            &criteria,
            &RunOptions {
                out_dir: cli.out_dir,
                workers: cli.parallel,
                urls_only: cli.urls_only,
                no_download: cli.no_download,
                no_verify: cli.no_verify,
                confirm: cli.confirm,
                count_only: cli.count,
            },
        )
    }
}

/// Diagnostics go to stderr so `--urls.only` output stays clean on stdout.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "gridfetch=debug" } else { "gridfetch=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load and normalize search criteria from the JSON config file.
fn load_criteria(path: &Path) -> Result<Criteria> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("{} not found", path.display()))?;
    let criteria: Criteria = serde_json::from_str(&contents)
        .with_context(|| format!("{} does not contain valid JSON", path.display()))?;
    if criteria.api.is_empty() {
        bail!("search_api is required parameter in config file");
    }
    Ok(criteria.normalized())
}
