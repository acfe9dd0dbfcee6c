//! Lingo Voice - voice conversation client for a language-learning backend
//!
//! This library provides the client side of the language-learning app:
//! - Voice turns (capture, STT, chat, TTS, playback)
//! - Text chat over the same session
//! - Speaker catalog for the TTS voice
//! - Word-chain vocabulary game
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  lingo CLI                           │
//! │   chat  │  voice  │  game  │  speakers  │  history  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Lingo Voice                          │
//! │  Capturer │ Codec │ VoiceChat │ Playback │ Session  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP JSON
//! ┌────────────────────▼────────────────────────────────┐
//! │            Language-learning backend                 │
//! │   STT  │  Chat  │  TTS  │  Sessions  │  Game        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod game;
pub mod pipeline;
pub mod retry;
pub mod session;
pub mod speakers;
pub mod transcript;
pub mod voice;

pub use backend::{Backend, GameBackend, HttpBackend, Stage, Strategy};
pub use config::Config;
pub use conversation::{ChatSession, TurnGate};
pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent};
pub use game::{GameOverReason, Hint, MAX_HINTS, Verdict, WordChain};
pub use pipeline::{Narrator, TurnOutcome, VoiceChat};
pub use retry::{RetryPolicy, with_transient_retry};
pub use session::Session;
pub use speakers::{DEFAULT_SPEAKER, Speaker};
pub use transcript::{ConversationTurn, Sender, Transcript};
