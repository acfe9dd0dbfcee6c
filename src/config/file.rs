//! TOML configuration file loading
//!
//! Supports `~/.config/lingo/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LingoConfigFile {
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Retry behavior for loading models
    #[serde(default)]
    pub retry: RetryFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Word-chain game defaults
    #[serde(default)]
    pub game: GameFileConfig,
}

/// Backend connection
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL of the language-learning API (e.g. `https://api.example.com`)
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryFileConfig {
    /// Wait in seconds when the server gives no estimate
    pub default_delay_secs: Option<u64>,

    /// Upper bound in seconds on a server-provided wait
    pub max_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// TTS speaker id (e.g. "p225")
    pub speaker: Option<String>,

    /// "auto", "buffered" or "chunked"
    pub capture_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// "default" or "casual"
    pub strategy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GameFileConfig {
    pub difficulty: Option<String>,

    /// Seconds allowed per answer
    pub turn_seconds: Option<u64>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if `content` is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> crate::Result<LingoConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Read and parse the config file at `path`
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the file can't be read, or the TOML error
pub fn read_config_file(path: &Path) -> crate::Result<LingoConfigFile> {
    let content = std::fs::read_to_string(path)?;
    parse_config_file(&content)
}

/// Load the TOML config file from the standard path
///
/// Returns `LingoConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LingoConfigFile {
    let Some(path) = config_file_path() else {
        return LingoConfigFile::default();
    };

    if !path.exists() {
        return LingoConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            LingoConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/lingo/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lingo").join("config.toml"))
}
