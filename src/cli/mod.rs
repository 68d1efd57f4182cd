pub mod commands;

use clap::{Parser, Subcommand};
use crate::config::{Config, LoggingConfig};
use crate::error::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "paperbot")]
#[command(about = "Reads summarized news feeds aloud")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, summarize and read the news (default)
    Run {
        /// Print instead of speaking
        #[arg(long)]
        no_speak: bool,

        /// Only these categories (by name)
        categories: Vec<String>,
    },

    /// List configured feeds and whether they are cached
    ListFeeds,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect or maintain the disk cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Look for corrupt or orphaned entries
    Check {
        /// Remove what the check finds
        #[arg(long)]
        fix: bool,
    },

    /// Remove entries
    Clear {
        /// Only entries with this tag (feed or summary)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show cache size and location
    Stats,

    /// Drop expired entries and shrink to the size limit
    Cull,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let command = self.command.unwrap_or(Commands::Run {
            no_speak: false,
            categories: Vec::new(),
        });

        // These two work without a valid configuration
        match command {
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                return Ok(());
            }
            Commands::Init { force } => {
                commands::init_logging(self.debug, self.verbose, &LoggingConfig::default())?;
                return commands::init(self.config, force);
            }
            _ => {}
        }

        let config = Config::load_or_default(self.config.as_deref())?;
        commands::init_logging(self.debug, self.verbose, &config.logging)?;

        match command {
            Commands::Run { no_speak, categories } => {
                commands::run(&config, no_speak, &categories).await
            }
            Commands::ListFeeds => {
                commands::list_feeds(&config)
            }
            Commands::Cache { action } => {
                commands::cache(&config, action)
            }
            Commands::Init { .. } | Commands::Completions { .. } => Ok(()),
        }
    }
}
