//! HTTP client for the language-learning backend
//!
//! Every call goes through one base URL. Failures are classified into the
//! retryable "model currently loading" signal and terminal remote errors.

mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use types::{
    ChatRequest, GameStartRequest, GameState, HintRequest, HintResult, Stage, Strategy,
    SttRequest, TtsRequest, VerifyRequest, VerifyResult,
};

use types::{ChatResponse, ErrorBody, GameStartResponse, SessionHistory, SttResponse, TtsResponse};

use crate::retry::{estimate_from_secs, is_model_loading};
use crate::transcript::ConversationTurn;
use crate::{Config, Error, Result};

/// Conversation endpoints used by the voice pipeline
#[async_trait]
pub trait Backend: Send + Sync {
    /// Transcribe base64 audio, returning the recognized text
    async fn transcribe(&self, request: &SttRequest) -> Result<String>;

    /// Send a chat message, returning the bot reply
    async fn chat(&self, request: &ChatRequest) -> Result<String>;

    /// Synthesize speech, returning base64 audio
    async fn synthesize(&self, request: &TtsRequest) -> Result<String>;

    /// Fetch the server-side transcript of a session
    async fn session_history(&self, session_id: &str) -> Result<Vec<ConversationTurn>>;

    /// Discard server-side session state
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Word-chain game endpoints
#[async_trait]
pub trait GameBackend: Send + Sync {
    /// Start a new game for a session
    async fn start_game(&self, request: &GameStartRequest) -> Result<GameState>;

    /// Check an answer against the current word
    async fn verify_answer(&self, request: &VerifyRequest) -> Result<VerifyResult>;

    /// Ask for a hint on the current word
    async fn hint(&self, request: &HintRequest) -> Result<HintResult>;
}

/// `reqwest`-backed implementation of [`Backend`] and [`GameBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for `base_url` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty or the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("API base URL must not be empty".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        tracing::debug!(base_url = %base_url, timeout_secs = timeout.as_secs(), "backend client initialized");

        Ok(Self { client, base_url })
    }

    /// Create a client from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    /// Configured base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<Req, Resp>(&self, stage: Stage, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(%stage, error = %e, "request failed");
                Error::remote(stage, None, e.to_string())
            })?;

        read_response(stage, response).await
    }

    fn session_url(&self, session_id: &str) -> String {
        self.endpoint(&format!("/api/session/{session_id}"))
    }
}

/// Read a response body, classifying error shapes before decoding `Resp`
async fn read_response<Resp: DeserializeOwned>(
    stage: Stage,
    response: reqwest::Response,
) -> Result<Resp> {
    let status = response.status();
    tracing::debug!(%stage, status = %status, "received response");

    let body = response
        .text()
        .await
        .map_err(|e| Error::remote(stage, Some(status.as_u16()), e.to_string()))?;

    if !status.is_success() {
        let err = classify_error(stage, Some(status.as_u16()), &body);
        if !err.is_model_loading() {
            tracing::error!(%stage, status = %status, body = %body, "backend API error");
        }
        return Err(err);
    }

    let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
        tracing::error!(%stage, error = %e, "failed to parse response");
        Error::remote(stage, Some(status.as_u16()), format!("invalid response body: {e}"))
    })?;

    // Some model hosts answer 200 with an error payload
    if value.get("error").is_some_and(|e| !e.is_null()) {
        return Err(classify_error(stage, Some(status.as_u16()), &body));
    }

    serde_json::from_value(value).map_err(|e| {
        tracing::error!(%stage, error = %e, "unexpected response shape");
        Error::remote(stage, Some(status.as_u16()), format!("unexpected response shape: {e}"))
    })
}

/// Map an error body to either the loading signal or a terminal error
pub(crate) fn classify_error(stage: Stage, status: Option<u16>, body: &str) -> Error {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    match parsed.message() {
        Some(message) if is_model_loading(&message) => Error::ModelLoading {
            stage,
            estimated_time: parsed.estimated_time.and_then(estimate_from_secs),
        },
        Some(message) => Error::remote(stage, status, message),
        None if body.trim().is_empty() => Error::remote(
            stage,
            status,
            status.map_or_else(|| "empty response".to_string(), |s| format!("HTTP {s}")),
        ),
        None => Error::remote(stage, status, body.trim().to_string()),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn transcribe(&self, request: &SttRequest) -> Result<String> {
        tracing::debug!(audio_chars = request.audio.len(), "starting transcription");

        let result: SttResponse = self.post_json(Stage::Stt, "/api/speech/stt", request).await?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        tracing::debug!(session_id = %request.session_id, strategy = ?request.strategy, "sending chat message");

        let result: ChatResponse = self.post_json(Stage::Chat, "/api/chat", request).await?;

        tracing::debug!(reply_chars = result.response.len(), "chat reply received");
        Ok(result.response)
    }

    async fn synthesize(&self, request: &TtsRequest) -> Result<String> {
        tracing::debug!(speaker = %request.speaker, text_chars = request.text.len(), "starting synthesis");

        let result: TtsResponse = self.post_json(Stage::Tts, "/api/speech/tts", request).await?;

        tracing::debug!(audio_chars = result.audio.len(), "synthesis complete");
        Ok(result.audio)
    }

    async fn session_history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let url = self.session_url(session_id);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::remote(Stage::Session, None, e.to_string()))?;

        let history: SessionHistory = read_response(Stage::Session, response).await?;
        Ok(history.messages)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.session_url(session_id);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| Error::remote(Stage::Session, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(Stage::Session, Some(status.as_u16()), &body));
        }

        tracing::debug!(session_id, "session deleted");
        Ok(())
    }
}

#[async_trait]
impl GameBackend for HttpBackend {
    async fn start_game(&self, request: &GameStartRequest) -> Result<GameState> {
        let result: GameStartResponse = self.post_json(Stage::Game, "/api/game/start", request).await?;
        tracing::debug!(word = %result.game_state.current_word, "game started");
        Ok(result.game_state)
    }

    async fn verify_answer(&self, request: &VerifyRequest) -> Result<VerifyResult> {
        self.post_json(Stage::Game, "/api/game/verify", request).await
    }

    async fn hint(&self, request: &HintRequest) -> Result<HintResult> {
        self.post_json(Stage::Game, "/api/game/hint", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_loading_with_estimate() {
        let err = classify_error(
            Stage::Tts,
            Some(503),
            r#"{"error":"Model currently loading","estimated_time":5}"#,
        );
        assert!(err.is_model_loading());
        assert_eq!(err.estimated_time(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn classifies_loading_without_estimate() {
        let err = classify_error(Stage::Stt, Some(503), r#"{"error":"model is currently loading"}"#);
        assert!(err.is_model_loading());
        assert_eq!(err.estimated_time(), None);
    }

    #[test]
    fn negative_estimate_is_ignored() {
        let err = classify_error(
            Stage::Stt,
            Some(503),
            r#"{"error":"currently loading","estimated_time":-3}"#,
        );
        assert_eq!(err.estimated_time(), None);
    }

    #[test]
    fn huge_estimate_saturates() {
        let err = classify_error(
            Stage::Tts,
            Some(503),
            r#"{"error":"currently loading","estimated_time":1e20}"#,
        );
        assert_eq!(err.estimated_time(), Some(Duration::MAX));
    }

    #[test]
    fn other_errors_are_terminal() {
        let err = classify_error(Stage::Chat, Some(500), r#"{"error":"Internal Server Error"}"#);
        match err {
            Error::Remote { stage, status, message } => {
                assert_eq!(stage, Stage::Chat);
                assert_eq!(status, Some(500));
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_body_is_terminal() {
        let err = classify_error(Stage::Stt, Some(502), "Bad Gateway");
        assert!(matches!(err, Error::Remote { ref message, .. } if message == "Bad Gateway"));
    }

    #[test]
    fn empty_body_reports_status() {
        let err = classify_error(Stage::Session, Some(404), "");
        assert!(matches!(err, Error::Remote { ref message, .. } if message == "HTTP 404"));
    }

    #[test]
    fn rejects_empty_base_url() {
        assert!(HttpBackend::new("  ", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:3000");
        assert_eq!(backend.endpoint("/api/chat"), "http://localhost:3000/api/chat");
    }
}
