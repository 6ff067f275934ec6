//! Command-line interface.
//!
//! This module contains the CLI parser and dispatches to command-specific
//! modules.

mod commands;
mod icons;
mod progress;
mod prompt;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use bookscout::config::Settings;

#[derive(Parser)]
#[command(name = "bookscout")]
#[command(about = "Crawl marketplace book listings into a CSV catalog")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "BOOKSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Walk every configured category and append qualifying books
    Crawl(CrawlArgs),

    /// Sort an existing output file by category, then review count
    Sort {
        /// Output CSV file (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize an existing output file per category
    Stats {
        /// Output CSV file (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only count rows with at least this many reviews
        #[arg(long)]
        min_reviews: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
pub struct CrawlArgs {
    /// Pause for a human on captchas and retry failed page loads
    #[arg(short, long)]
    pub attended: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Delete the existing output file and start over
    #[arg(long)]
    pub fresh: bool,

    /// Output CSV file (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum pages per category
    #[arg(short, long)]
    pub pages: Option<u32>,

    /// Minimum review count for a book to be kept
    #[arg(long)]
    pub min_reviews: Option<u64>,

    /// Only crawl the named category (repeatable)
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration and list categories
    Check,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Crawl(args) => commands::crawl::cmd_crawl(settings, args).await,
        Commands::Sort { output } => {
            if let Some(output) = output {
                settings.output = output;
            }
            commands::sort::cmd_sort(&settings)
        }
        Commands::Stats {
            output,
            min_reviews,
        } => {
            if let Some(output) = output {
                settings.output = output;
            }
            commands::stats::cmd_stats(&settings, min_reviews)
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_cmd::cmd_config_show(&settings),
            ConfigCommands::Check => commands::config_cmd::cmd_config_check(&settings),
        },
    }
}
