//! Spoken output through an external text-to-speech executable.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::error::{Error, Result};
use crate::news::CategorySummaries;

/// Lines spoken before the summaries. Empty ones mean "say nothing".
pub const OPENERS: &[&str] = &[
    "Here's the news.",
    "Now to the news update.",
    "These are the latest headlines.",
    "Today's news.",
    "Current events.",
    "Here are the updates.",
    "I found these top stories.",
    "Summarizing the news now.",
    "This is what's happening.",
    "Here are the latest updates.",
    "Here are the latest news headlines.",
    "This is the latest news update.",
    "Check out these top stories.",
    "",
    "",
    "",
    "Ok",
    "Ready",
    "Proceeding",
];

#[async_trait]
pub trait Announcer: Send + Sync {
    /// Speaks one utterance. Blank messages are not spoken.
    async fn say(&self, message: &str) -> Result<()>;
}

/// Runs `program [args..] <message>` once per utterance and waits for it to finish.
#[derive(Debug, Clone)]
pub struct CommandAnnouncer {
    program: String,
    args: Vec<String>,
}

impl CommandAnnouncer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn from_config(config: &SpeechConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Announcer for CommandAnnouncer {
    async fn say(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Ok(());
        }

        debug!("{} <- {} chars", self.program, message.len());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .status()
            .await
            .map_err(|e| Error::Speech(format!("Failed to run {}: {}", self.program, e)))?;

        if !status.success() {
            warn!("{} exited with {}", self.program, status);
        }

        Ok(())
    }
}

/// Prints utterances instead of speaking them
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleAnnouncer;

#[async_trait]
impl Announcer for ConsoleAnnouncer {
    async fn say(&self, message: &str) -> Result<()> {
        if !message.trim().is_empty() {
            println!("{}", message);
        }
        Ok(())
    }
}

pub fn pick_opener() -> &'static str {
    OPENERS[fastrand::usize(..OPENERS.len())]
}

/// Reads out every category in order: an opener, a pause, then each header and its articles.
///
/// Categories that ended up without articles are passed over.
pub async fn announce_summaries(
    announcer: &dyn Announcer,
    summaries: &[CategorySummaries],
    pause: Duration,
) -> Result<()> {
    announcer.say(pick_opener()).await?;
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }

    for category in summaries {
        if category.articles.is_empty() {
            debug!("Nothing to read for {}", category.category);
            continue;
        }

        info!("Reading {} articles for {}", category.articles.len(), category.category);
        announcer.say(&format!("Here are articles for {}:", category.category)).await?;
        for article in &category.articles {
            announcer.say(article).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        said: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Announcer for Recorder {
        async fn say(&self, message: &str) -> Result<()> {
            if !message.trim().is_empty() {
                self.said.lock().push(message.to_string());
            }
            Ok(())
        }
    }

    fn category(name: &str, articles: &[&str]) -> CategorySummaries {
        CategorySummaries {
            category: name.to_string(),
            articles: articles.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_announce_order() {
        let recorder = Recorder::default();
        let summaries = vec![
            category("World News", &["\nA\n\nfirst", "\nB\n\nsecond"]),
            category("Empty", &[]),
            category("Linux News", &["\nC\n\nthird"]),
        ];

        announce_summaries(&recorder, &summaries, Duration::ZERO).await.unwrap();

        let said: Vec<String> = recorder
            .said
            .lock()
            .iter()
            .filter(|m| !OPENERS.contains(&m.as_str()))
            .cloned()
            .collect();
        assert_eq!(said, vec![
            "Here are articles for World News:",
            "\nA\n\nfirst",
            "\nB\n\nsecond",
            "Here are articles for Linux News:",
            "\nC\n\nthird",
        ]);
    }

    #[test]
    fn test_pick_opener_is_from_list() {
        for _ in 0..50 {
            assert!(OPENERS.contains(&pick_opener()));
        }
    }

    #[tokio::test]
    async fn test_command_receives_message_as_last_argument() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("spoken.txt");
        // sh -c binds the first trailing argument to $0
        let script = format!("printf '%s|' \"$0\" >> '{}'", out.display());
        let announcer = CommandAnnouncer::new("sh", vec!["-c".to_string(), script]);

        announcer.say("Hello there").await.unwrap();
        announcer.say("   ").await.unwrap();
        announcer.say("Second line").await.unwrap();

        let spoken = std::fs::read_to_string(&out).unwrap();
        assert_eq!(spoken, "Hello there|Second line|");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let announcer = CommandAnnouncer::new("false", vec![]);
        assert!(announcer.say("anything").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_program_is_speech_error() {
        let announcer = CommandAnnouncer::new("paperbot-no-such-tts", vec![]);
        assert!(matches!(announcer.say("hi").await, Err(Error::Speech(_))));
    }
}
