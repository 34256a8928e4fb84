// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use chainscrape_runtime::cli::{self, parse_cmd::ParseArgs, scrape_cmd::ScrapeArgs, serve_cmd::ServeArgs};
use chainscrape_runtime::config::ScrapeConfig;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chainscrape",
    about = "chainscrape: side-by-side options chain scraper",
    version,
    after_help = "Run 'chainscrape <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (default: ~/.chainscrape/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the Chromium binary
    #[arg(long, global = true)]
    chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the options chain for a symbol and expiration
    Scrape(ScrapeArgs),
    /// Extract the straddle table from a saved HTML page
    Parse(ParseArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env().add_directive(format!("chainscrape={level}").parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_config(opts: &Cli) -> Result<ScrapeConfig> {
    let mut config = ScrapeConfig::load(opts.config.as_deref())?;
    if let Some(path) = &opts.chrome_path {
        config.browser.chrome_path = Some(path.clone());
    }
    if opts.headed {
        config.browser.headless = false;
    }
    Ok(config)
}

async fn run(opts: &Cli) -> Result<()> {
    match &opts.command {
        Commands::Scrape(args) => cli::scrape_cmd::run(load_config(opts)?, args).await,
        Commands::Parse(args) => cli::parse_cmd::run(&load_config(opts)?, args).await,
        Commands::Serve(args) => cli::serve_cmd::run(load_config(opts)?, args).await,
        Commands::Doctor => cli::doctor::run(&load_config(opts)?).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "chainscrape", &mut std::io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Cli::parse();
    init_tracing(opts.verbose, opts.log_json)?;

    let result = run(&opts).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
