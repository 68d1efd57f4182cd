use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap_complete::{generate, Shell};
use clap::CommandFactory;
use tracing::{debug, info, warn};

use crate::cli::{CacheCommand, Cli};
use crate::config::{Config, FeedCategory, LoggingConfig};
use crate::error::{Error, Result};
use crate::feed::service::feed_key;
use crate::news::NewsDesk;
use crate::speech::{self, Announcer, CommandAnnouncer, ConsoleAnnouncer};
use crate::storage::CacheSession;

/// Fetch, summarize and announce the configured feeds
pub async fn run(config: &Config, no_speak: bool, only: &[String]) -> Result<()> {
    let categories = select_categories(&config.feeds, only)?;
    let cache = Arc::new(open_cache(config)?);

    let announcer: Arc<dyn Announcer> = if no_speak {
        Arc::new(ConsoleAnnouncer)
    } else {
        Arc::new(CommandAnnouncer::from_config(&config.speech))
    };

    let desk = NewsDesk::from_config(config, cache.clone(), announcer.clone())?;
    let report = desk.fetch_and_summarize(&categories).await;

    if !report.failed_categories.is_empty() {
        warn!("No news for: {}", report.failed_categories.join(", "));
    }

    let pause = if no_speak { Duration::ZERO } else { Duration::from_millis(config.speech.pause_ms) };
    speech::announce_summaries(announcer.as_ref(), &report.summaries, pause).await?;

    let stats = cache.stats();
    info!(
        "Cache: {} hits, {} misses ({:.0}% hit rate)",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );

    Ok(())
}

/// List all configured feeds
pub fn list_feeds(config: &Config) -> Result<()> {
    info!("Listing feeds");

    if config.feeds.is_empty() {
        println!("📋 No feeds configured.");
        return Ok(());
    }

    let cache = open_cache(config)?;

    println!("📋 Configured Feeds:");
    println!("====================");

    for feed in &config.feeds {
        let status = if cache.is_incache(&feed_key(&feed.url)) { "cached" } else { "not cached" };
        println!("\n📰 {}", feed.name);
        println!("   URL: {}", feed.url);
        println!("   Status: {}", status);
    }

    println!("\n⏱️  Feeds stay cached for {} hours", config.settings.cache_expiry_hours);
    Ok(())
}

/// Write the default configuration
pub fn init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_file = match config_path {
        Some(path) => path,
        None => Config::config_file()?,
    };

    if config_file.exists() && !force {
        warn!("Configuration file already exists: {}", config_file.display());
        println!("Configuration already exists at {}", config_file.display());
        println!("   Use --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = config_file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("Created configuration directory: {}", parent.display());
        }
    }

    let config = Config::default();
    config.save(&config_file)?;
    info!("Created default configuration: {}", config_file.display());

    println!("✅ paperbot initialized!");
    println!("   Config file: {}", config_file.display());
    println!("   Cache directory: {}", config.cache_path()?.display());
    println!("   Speech command: {}", config.speech.command);
    println!();
    println!("Next steps:");
    println!("   1. Start Ollama and pull the model: ollama pull {}", config.summarizer.model);
    println!("   2. Read the news: paperbot run");

    Ok(())
}

pub fn cache(config: &Config, action: CacheCommand) -> Result<()> {
    let cache = open_cache(config)?;

    match action {
        CacheCommand::Check { fix } => {
            let issues = cache.check(fix)?;
            if issues.is_empty() {
                println!("✅ Cache is healthy ({} entries)", cache.len());
            } else {
                println!("⚠️  Found {} issue(s):", issues.len());
                for issue in &issues {
                    println!("   - {}", issue);
                }
                if fix {
                    println!("🔧 Removed the affected files");
                } else {
                    println!("   Run 'paperbot cache check --fix' to repair");
                }
            }
        }
        CacheCommand::Clear { tag } => {
            let removed = match tag {
                Some(tag) => cache.evict(&tag)?,
                None => cache.clear_cache()?,
            };
            println!("🗑️  Removed {} entries", removed);
        }
        CacheCommand::Stats => {
            let volume = cache.volume();
            let max = cache.max_cache_size();
            println!("📊 Cache");
            println!("   Directory: {}", cache.cache_dir().display());
            println!("   Entries: {}", cache.len());
            println!("   Size: {} of {} ({:.1}%)", format_bytes(volume), format_bytes(max), percent(volume, max));
        }
        CacheCommand::Cull => {
            let removed = cache.cull()?;
            println!("🧹 Culled {} entries, {} in use", removed, format_bytes(cache.volume()));
        }
    }

    Ok(())
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Initialize logging from the verbosity flags, falling back to `RUST_LOG` and then
/// the configured level. Logs go to stderr so stdout stays clean.
pub fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug);

    let result = if logging.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized");
    Ok(())
}

fn open_cache(config: &Config) -> Result<CacheSession> {
    CacheSession::open(config.cache_path()?, config.max_cache_bytes())
}

/// Categories named on the command line, in configured order. No names means all of them.
fn select_categories(feeds: &[FeedCategory], only: &[String]) -> Result<Vec<FeedCategory>> {
    if only.is_empty() {
        return Ok(feeds.to_vec());
    }

    if let Some(unknown) = only
        .iter()
        .find(|name| !feeds.iter().any(|feed| feed.name.eq_ignore_ascii_case(name)))
    {
        return Err(Error::NotFound(format!("No feed named '{}'", unknown)));
    }

    Ok(feeds
        .iter()
        .filter(|feed| only.iter().any(|name| feed.name.eq_ignore_ascii_case(name)))
        .cloned()
        .collect())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
