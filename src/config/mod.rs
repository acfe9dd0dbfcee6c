//! Configuration management
//!
//! Values resolve env > TOML file > default. Command-line flags are applied
//! on top by the binary.

mod file;

use std::time::Duration;

pub use file::{
    LingoConfigFile, config_file_path, load_config_file, parse_config_file, read_config_file,
};

use crate::backend::Strategy;
use crate::retry::RetryPolicy;
use crate::speakers::DEFAULT_SPEAKER;
use crate::voice::CapturePreference;
use crate::{Error, Result};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed per word-chain answer
pub const DEFAULT_TURN_LIMIT: Duration = Duration::from_secs(30);

/// Default word-chain difficulty
pub const DEFAULT_DIFFICULTY: &str = "basic";

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the backend API, without trailing slash
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub voice: VoiceConfig,
    pub chat: ChatConfig,
    pub game: GameConfig,
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// TTS speaker id
    pub speaker: String,
    pub capture: CapturePreference,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Conversation style sent with every chat message
    pub strategy: Strategy,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub difficulty: String,
    pub turn_limit: Duration,
}

impl Config {
    /// Load configuration from `overrides`, the environment and the config
    /// file, in that order of precedence
    ///
    /// `overrides` is keyed like the environment (`LINGO_SPEAKER`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API base URL is configured or a value
    /// is invalid
    pub fn load(overrides: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| {
            overrides(key).or_else(|| std::env::var(key).ok())
        })
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API base URL is configured or a value
    /// is invalid
    pub fn from_sources(fc: LingoConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = env("LINGO_API_BASE_URL")
            .or(fc.api.base_url)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "API base URL not set (LINGO_API_BASE_URL or [api] base_url)".to_string(),
                )
            })?;

        let request_timeout = parse_secs(env("LINGO_REQUEST_TIMEOUT_SECS"), "LINGO_REQUEST_TIMEOUT_SECS")?
            .or(fc.api.timeout_secs)
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);

        // Retry (toml > default)
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            default_delay: fc
                .retry
                .default_delay_secs
                .map_or(defaults.default_delay, Duration::from_secs),
            max_delay: fc
                .retry
                .max_delay_secs
                .map_or(defaults.max_delay, Duration::from_secs),
            ..defaults
        };

        let voice = VoiceConfig {
            speaker: env("LINGO_SPEAKER")
                .or(fc.voice.speaker)
                .unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
            capture: env("LINGO_CAPTURE_MODE")
                .or(fc.voice.capture_mode)
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        let chat = ChatConfig {
            strategy: env("LINGO_CHAT_STRATEGY")
                .or(fc.chat.strategy)
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        let game = GameConfig {
            difficulty: fc
                .game
                .difficulty
                .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
            turn_limit: fc
                .game
                .turn_seconds
                .map_or(DEFAULT_TURN_LIMIT, Duration::from_secs),
        };

        tracing::debug!(
            api_base_url = %api_base_url,
            speaker = %voice.speaker,
            capture = ?voice.capture,
            strategy = ?chat.strategy,
            "configuration resolved"
        );

        Ok(Self {
            api_base_url,
            request_timeout,
            retry,
            voice,
            chat,
            game,
        })
    }
}

fn parse_secs(value: Option<String>, key: &str) -> Result<Option<u64>> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} must be a whole number of seconds")))
        })
        .transpose()
}
