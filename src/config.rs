use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Error, Result};

/// Environment variable that overrides the feed cache expiry, in hours.
pub const CACHE_EXPIRY_ENV: &str = "CACHE_EXPIRY_HOURS";

pub const DEFAULT_PROMPT: &str = "Provide a clear, well-organized summary in 2 to 3 paragraphs. \
Avoid redundancy, ensure sentences are connected, and maintain logical flow. \
Exclude any links, markdown, or formatting.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedCategory>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A named news category and the feed that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCategory {
    pub name: String,
    pub url: String,
}

impl FeedCategory {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// How long a fetched feed stays cached
    #[serde(default = "default_cache_expiry_hours")]
    pub cache_expiry_hours: u64,

    #[serde(default = "default_summary_expiry_hours")]
    pub summary_expiry_hours: u64,

    /// Entries per feed that get summarized
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Cache directory; the platform cache dir is used when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default = "default_summarizer_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Executable that speaks its last argument aloud
    #[serde(default = "default_speech_command")]
    pub command: String,

    /// Extra arguments placed before the message
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| Error::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the file when one exists, otherwise starts from the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file()?,
        };

        if path.exists() {
            return Self::load_with_env(&path);
        }

        tracing::debug!("No config at {}, using defaults", path.display());
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for feed in &self.feeds {
            if feed.name.is_empty() {
                return Err(Error::Invalid("Feed name cannot be empty".to_string()));
            }

            url::Url::parse(&feed.url)
                .map_err(|_| Error::InvalidUrl(feed.url.clone()))?;
        }

        if self.settings.cache_expiry_hours == 0 {
            return Err(Error::Invalid("Cache expiry must be greater than 0 hours".to_string()));
        }

        if self.settings.summary_expiry_hours == 0 {
            return Err(Error::Invalid("Summary expiry must be greater than 0 hours".to_string()));
        }

        if self.settings.max_entries == 0 {
            return Err(Error::Invalid("Max entries must be greater than 0".to_string()));
        }

        if self.summarizer.model.is_empty() {
            return Err(Error::Config("Summarizer model cannot be empty".to_string()));
        }

        url::Url::parse(&self.summarizer.host)
            .map_err(|_| Error::InvalidUrl(self.summarizer.host.clone()))?;

        if self.speech.command.is_empty() {
            return Err(Error::Config("Speech command cannot be empty".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(hours) = lookup(CACHE_EXPIRY_ENV) {
            match hours.parse() {
                Ok(val) => self.settings.cache_expiry_hours = val,
                Err(_) => tracing::warn!("Ignoring {}={:?}: not a number of hours", CACHE_EXPIRY_ENV, hours),
            }
        }

        if let Some(level) = lookup("PAPERBOT_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(host) = lookup("PAPERBOT_OLLAMA_HOST") {
            self.summarizer.host = host;
        }

        if let Some(model) = lookup("PAPERBOT_OLLAMA_MODEL") {
            self.summarizer.model = model;
        }

        if let Some(command) = lookup("PAPERBOT_SPEECH_COMMAND") {
            self.speech.command = command;
        }
    }

    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.cache_expiry_hours.saturating_mul(60 * 60))
    }

    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.summary_expiry_hours.saturating_mul(60 * 60))
    }

    /// Resolved cache directory
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::cache_dir(),
        }
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.cache.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("paperbot"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("paperbot"))
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            settings: Settings::default(),
            cache: CacheSettings::default(),
            summarizer: SummarizerConfig::default(),
            speech: SpeechConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_expiry_hours: default_cache_expiry_hours(),
            summary_expiry_hours: default_summary_expiry_hours(),
            max_entries: default_max_entries(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_model(),
            prompt: default_prompt(),
            timeout: default_summarizer_timeout(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: default_speech_command(),
            args: Vec::new(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

// "Florida News" (orlandosentinel.com) is left out: its feed errors on every fetch.
fn default_feeds() -> Vec<FeedCategory> {
    vec![
        FeedCategory::new("National News", "https://rss.nytimes.com/services/xml/rss/nyt/HomePage.xml"),
        FeedCategory::new("World News", "https://feeds.bbci.co.uk/news/world/rss.xml"),
        FeedCategory::new("Boca Raton News", "https://www.bocaratontribune.com/feed/"),
        FeedCategory::new("Science News", "https://www.sciencedaily.com/rss/top/science.xml"),
        FeedCategory::new("Linux News", "https://www.phoronix.com/rss.php"),
        FeedCategory::new("Consumer Economy", "https://www.npr.org/rss/rss.php?id=1017"),
    ]
}

fn default_cache_expiry_hours() -> u64 { 6 }
fn default_summary_expiry_hours() -> u64 { 4 }
fn default_max_entries() -> usize { 5 }
fn default_max_retries() -> usize { 1 }
fn default_user_agent() -> String {
    format!("paperbot/{}", env!("CARGO_PKG_VERSION"))
}
fn default_timeout() -> u64 { 30 }

fn default_max_size_mb() -> u64 { 100 }

fn default_ollama_host() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "llama3:8b".to_string() }
fn default_prompt() -> String { DEFAULT_PROMPT.to_string() }
fn default_summarizer_timeout() -> u64 { 120 }

fn default_speech_command() -> String { "pipeup".to_string() }
fn default_pause_ms() -> u64 { 1000 }

fn default_log_level() -> String { "warn".to_string() }
