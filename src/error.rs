//! Error types for the lingo voice client

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::Stage;

/// Result type alias for lingo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone could not be acquired
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// `stop` was called without a prior successful `start`
    #[error("no active capture")]
    NoActiveCapture,

    /// Capture finished without any audio
    #[error("captured audio is empty")]
    EmptyCapture,

    /// A typed message was empty or whitespace only
    #[error("message is empty")]
    EmptyMessage,

    /// A turn is already in flight for this session
    #[error("a turn is already in progress")]
    Busy,

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Reading a file-backed audio asset failed
    #[error("failed to read audio asset {}: {source}", path.display())]
    AssetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload is not valid base64
    #[error("malformed audio payload: {0}")]
    MalformedPayload(String),

    /// Backend model is still being loaded; retryable
    #[error("{stage} model is currently loading")]
    ModelLoading {
        stage: Stage,
        estimated_time: Option<Duration>,
    },

    /// Non-retryable backend failure
    #[error("{stage} request failed: {message}")]
    Remote {
        stage: Stage,
        status: Option<u16>,
        message: String,
    },

    /// Session deletion failed (logged, never surfaced)
    #[error("session teardown failed: {0}")]
    SessionTeardown(String),

    /// Speaker id not in the catalog
    #[error("speaker not found: {0}")]
    SpeakerNotFound(String),

    /// Word-chain game rule violation
    #[error("game error: {0}")]
    Game(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a terminal remote error for a pipeline stage
    pub fn remote(stage: Stage, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            stage,
            status,
            message: message.into(),
        }
    }

    /// Whether this is the backend's "model currently loading" signal
    #[must_use]
    pub const fn is_model_loading(&self) -> bool {
        matches!(self, Self::ModelLoading { .. })
    }

    /// Server-provided wait before the model is expected to be ready
    #[must_use]
    pub const fn estimated_time(&self) -> Option<Duration> {
        match self {
            Self::ModelLoading { estimated_time, .. } => *estimated_time,
            _ => None,
        }
    }

    /// Errors raised before any network call that the user must see
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::EmptyCapture
                | Self::EmptyMessage
                | Self::Busy
                | Self::Game(_)
        )
    }

    /// Collapse a leftover loading signal into a terminal remote error
    ///
    /// Used once the retry budget is spent so callers only ever see
    /// `Remote` for a failed stage.
    #[must_use]
    pub fn into_terminal(self) -> Self {
        match self {
            Self::ModelLoading { stage, .. } => Self::Remote {
                stage,
                status: Some(503),
                message: "model still loading after retry".to_string(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_collapses_to_remote() {
        let err = Error::ModelLoading {
            stage: Stage::Tts,
            estimated_time: Some(Duration::from_secs(5)),
        };
        assert!(err.is_model_loading());
        assert_eq!(err.estimated_time(), Some(Duration::from_secs(5)));

        match err.into_terminal() {
            Error::Remote { stage, status, .. } => {
                assert_eq!(stage, Stage::Tts);
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn terminal_errors_pass_through() {
        let err = Error::remote(Stage::Chat, Some(500), "boom").into_terminal();
        assert!(matches!(err, Error::Remote { stage: Stage::Chat, .. }));
        assert_eq!(err.to_string(), "chat request failed: boom");
    }

    #[test]
    fn capture_errors_are_user_facing() {
        assert!(Error::EmptyCapture.is_user_facing());
        assert!(Error::PermissionDenied("no input device".into()).is_user_facing());
        assert!(!Error::remote(Stage::Stt, None, "x").is_user_facing());
    }
}
