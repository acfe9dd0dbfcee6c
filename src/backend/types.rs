//! Wire types for the backend HTTP API

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::transcript::ConversationTurn;

/// Remote call a request belongs to, used for error attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Speech-to-text
    Stt,
    /// Chat completion
    Chat,
    /// Text-to-speech
    Tts,
    /// Session history / deletion
    Session,
    /// Word-chain game endpoints
    Game,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stt => write!(f, "STT"),
            Self::Chat => write!(f, "chat"),
            Self::Tts => write!(f, "TTS"),
            Self::Session => write!(f, "session"),
            Self::Game => write!(f, "game"),
        }
    }
}

/// Reply style requested from the chat endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Default,
    Casual,
}

impl FromStr for Strategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "casual" => Ok(Self::Casual),
            other => Err(crate::Error::Config(format!(
                "unknown chat strategy '{other}' (expected default or casual)"
            ))),
        }
    }
}

/// `POST /api/speech/stt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SttRequest {
    /// Base64-encoded audio
    pub audio: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SttResponse {
    pub text: String,
}

/// `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub response: String,
}

/// `POST /api/speech/tts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TtsRequest {
    pub text: String,
    pub speaker: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TtsResponse {
    pub audio: String,
}

/// `GET /api/session/:id`
#[derive(Debug, Deserialize)]
pub(crate) struct SessionHistory {
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
}

/// Error body shape shared by every endpoint
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<serde_json::Value>,
    pub estimated_time: Option<f64>,
}

impl ErrorBody {
    /// The `error` field as text, whatever its JSON type
    pub fn message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Current word-chain game state as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub current_word: String,
    #[serde(default)]
    pub hint_count: u32,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub streak: u32,
}

/// `POST /api/game/start`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartRequest {
    pub session_id: String,
    pub difficulty: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameStartResponse {
    pub game_state: GameState,
}

/// `POST /api/game/verify`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub session_id: String,
    pub answer: String,
}

/// Outcome of checking an answer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub correct: bool,
    pub new_word: Option<String>,
    #[serde(default)]
    pub message: String,
    pub score: Option<u32>,
    pub streak: Option<u32>,
}

/// `POST /api/game/hint`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRequest {
    pub session_id: String,
}

/// Hint for the current word
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResult {
    pub hint: String,
    #[serde(default)]
    pub possible_words: Vec<String>,
    pub hint_count: Option<u32>,
}
