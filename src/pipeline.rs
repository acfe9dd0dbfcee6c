//! Voice turn pipeline
//!
//! One turn runs strictly in sequence:
//!
//! ```text
//! stop capture ─► base64 ─► STT ─► user entry ─► Chat ─► bot entry ─► TTS ─► playback
//!                           ▲                                          ▲
//!                           └── one retry while the model is loading ──┘
//! ```
//!
//! Chat is never retried. Both transcript entries are appended before any
//! audio is synthesized, so playback can never reorder the transcript.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::backend::{Backend, Stage, SttRequest, TtsRequest};
use crate::conversation::ChatSession;
use crate::events::{EventBus, PipelineEvent};
use crate::retry::{RetryPolicy, retry_model_loading};
use crate::speakers::DEFAULT_SPEAKER;
use crate::transcript::{ConversationTurn, Sender, Transcript};
use crate::voice::{AudioCodec, Base64Codec, CaptureMode, Capturer, Playback, TTS_MIME};
use crate::{Error, Result};

/// Speaks text through the TTS stage and the playback sink
pub struct Narrator {
    backend: Arc<dyn Backend>,
    playback: Playback,
    speaker: String,
    retry: RetryPolicy,
    events: EventBus,
}

impl Narrator {
    pub fn new(backend: Arc<dyn Backend>, playback: Playback, events: EventBus) -> Self {
        Self {
            backend,
            playback,
            speaker: DEFAULT_SPEAKER.to_string(),
            retry: RetryPolicy::default(),
            events,
        }
    }

    #[must_use]
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    /// Retry policy shared by the STT and TTS stages
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    #[must_use]
    pub const fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Synthesize `text` with the selected speaker and play it to the end
    ///
    /// # Errors
    ///
    /// Returns the terminal TTS error, or a decode/playback error
    pub async fn speak(&self, text: &str) -> Result<()> {
        let request = TtsRequest {
            text: text.to_string(),
            speaker: self.speaker.clone(),
        };

        let audio = retry_model_loading(&self.retry, &self.events, Stage::Tts, || {
            self.backend.synthesize(&request)
        })
        .await?;

        self.playback.play(&audio, TTS_MIME).await
    }
}

/// Result of a completed voice turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub user_text: String,
    pub bot_text: String,
}

/// Voice conversation surface: capture, remote pipeline and playback
pub struct VoiceChat {
    chat: ChatSession,
    codec: Arc<dyn AudioCodec>,
    capturer: Mutex<Box<dyn Capturer>>,
    narrator: Narrator,
}

impl VoiceChat {
    /// Assemble a voice surface; the capture variant is fixed from here on
    pub fn new(chat: ChatSession, capturer: Box<dyn Capturer>, narrator: Narrator) -> Self {
        tracing::debug!(
            session_id = %chat.session_id(),
            mode = ?capturer.mode(),
            speaker = %narrator.speaker(),
            "voice chat ready"
        );

        Self {
            chat,
            codec: Arc::new(Base64Codec),
            capturer: Mutex::new(capturer),
            narrator,
        }
    }

    /// Use `codec` for the STT upload
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn AudioCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.chat.session_id()
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        self.chat.events()
    }

    #[must_use]
    pub const fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    #[must_use]
    pub fn capture_mode(&self) -> CaptureMode {
        self.lock_capturer().mode()
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.lock_capturer().is_capturing()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.chat.is_busy()
    }

    #[must_use]
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.chat.transcript()
    }

    /// Begin recording an utterance
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while the previous turn is in flight and
    /// [`Error::PermissionDenied`] if the microphone is unavailable
    pub fn start_capture(&self) -> Result<()> {
        if self.chat.is_busy() {
            tracing::debug!("capture rejected, turn in flight");
            return Err(Error::Busy);
        }

        self.lock_capturer().start().inspect_err(|e| {
            self.chat.report_failure(e);
        })
    }

    /// Stop recording and run the utterance through STT, chat and TTS
    ///
    /// Failures are logged and published as [`PipelineEvent::TurnFailed`];
    /// entries appended before the failing stage stay in the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a turn is in flight, capture errors, or
    /// the terminal error of the failing stage
    pub async fn finish_turn(&self) -> Result<TurnOutcome> {
        let _turn = self.chat.begin_turn()?;

        let result = self.run_turn().await;
        if let Err(e) = &result {
            self.chat.report_failure(e);
        }
        result
    }

    async fn run_turn(&self) -> Result<TurnOutcome> {
        let asset = self.lock_capturer().stop()?;
        tracing::debug!(bytes = asset.len(), mime = asset.mime(), "capture sealed");

        let request = SttRequest {
            audio: self.codec.to_base64(&asset),
        };
        drop(asset);

        let backend = self.chat.backend();
        let user_text = retry_model_loading(
            self.narrator.retry(),
            self.events(),
            Stage::Stt,
            || backend.transcribe(&request),
        )
        .await?;

        let user_text = user_text.trim().to_string();
        if user_text.is_empty() {
            return Err(Error::remote(Stage::Stt, None, "no speech recognized"));
        }

        self.chat.record(Sender::User, &user_text);
        self.events().emit(PipelineEvent::Transcribed {
            text: user_text.clone(),
        });

        let bot_text = self.chat.reply(&user_text).await?;

        self.chat.record(Sender::Bot, &bot_text);
        self.events().emit(PipelineEvent::Replied {
            text: bot_text.clone(),
        });

        self.narrator.speak(&bot_text).await?;

        Ok(TurnOutcome {
            user_text,
            bot_text,
        })
    }

    /// Server-side transcript for this session
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn history(&self) -> Result<Transcript> {
        self.chat.history().await
    }

    /// End the session, requesting deletion in the background
    #[must_use = "the deletion runs detached; drop the handle explicitly if unused"]
    pub fn close(self) -> Option<JoinHandle<()>> {
        self.chat.close()
    }

    fn lock_capturer(&self) -> std::sync::MutexGuard<'_, Box<dyn Capturer>> {
        self.capturer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
