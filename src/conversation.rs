//! Text conversation over one backend session
//!
//! [`ChatSession`] owns the session id, the local transcript and the turn
//! gate. The voice pipeline builds on it; text chat uses it directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::backend::{Backend, ChatRequest, Strategy};
use crate::events::{EventBus, PipelineEvent};
use crate::session::Session;
use crate::transcript::{ConversationTurn, Sender, Transcript};
use crate::{Error, Result};

/// Admits at most one turn at a time
#[derive(Debug, Default)]
pub struct TurnGate {
    busy: AtomicBool,
}

impl TurnGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the gate, emitting `Busy` now and `Idle` when the guard drops
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another turn holds the gate
    pub fn enter<'a>(&'a self, events: &'a EventBus) -> Result<TurnGuard<'a>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;

        events.emit(PipelineEvent::Busy);
        Ok(TurnGuard { gate: self, events })
    }
}

/// Releases the [`TurnGate`] on drop
#[derive(Debug)]
pub struct TurnGuard<'a> {
    gate: &'a TurnGate,
    events: &'a EventBus,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
        self.events.emit(PipelineEvent::Idle);
    }
}

/// One conversation surface: session, transcript and turn discipline
pub struct ChatSession {
    session: Session,
    transcript: Mutex<Transcript>,
    gate: TurnGate,
    events: EventBus,
    strategy: Option<Strategy>,
}

impl ChatSession {
    /// Open a new session against `backend`
    pub fn new(backend: Arc<dyn Backend>, events: EventBus) -> Self {
        Self {
            session: Session::new(backend),
            transcript: Mutex::new(Transcript::new()),
            gate: TurnGate::new(),
            events,
            strategy: None,
        }
    }

    /// Send `strategy` with every chat message
    #[must_use]
    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.session.backend()
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Snapshot of the local transcript
    #[must_use]
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.lock_transcript().turns().to_vec()
    }

    /// Send a typed message and wait for the reply
    ///
    /// The user entry is appended before the request is sent and stays in
    /// the transcript if the request fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMessage`] for blank input, [`Error::Busy`] if a
    /// turn is in flight, or the terminal chat error
    pub async fn send_text(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let _turn = self.begin_turn()?;

        self.record(Sender::User, text);

        match self.reply(text).await {
            Ok(reply) => {
                self.record(Sender::Bot, &reply);
                self.events.emit(PipelineEvent::Replied {
                    text: reply.clone(),
                });
                Ok(reply)
            }
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
        }
    }

    /// Server-side transcript for this session
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn history(&self) -> Result<Transcript> {
        self.session.history().await
    }

    /// End the session, requesting deletion in the background
    #[must_use = "the deletion runs detached; drop the handle explicitly if unused"]
    pub fn close(self) -> Option<JoinHandle<()>> {
        self.session.teardown()
    }

    pub(crate) fn begin_turn(&self) -> Result<TurnGuard<'_>> {
        self.gate.enter(&self.events)
    }

    pub(crate) fn record(&self, sender: Sender, text: &str) {
        let mut transcript = self.lock_transcript();
        let turn = transcript.push(sender, text);
        tracing::debug!(
            session_id = %self.session.id(),
            sender = turn.sender.as_str(),
            sequence = turn.sequence,
            "turn appended"
        );
    }

    /// Chat stage; never retried
    pub(crate) async fn reply(&self, message: &str) -> Result<String> {
        let request = ChatRequest {
            message: message.to_string(),
            session_id: self.session.id().to_string(),
            strategy: self.strategy,
        };

        self.backend()
            .chat(&request)
            .await
            .map_err(Error::into_terminal)
    }

    /// Log a failed turn and publish it for the user
    pub(crate) fn report_failure(&self, err: &Error) {
        if err.is_user_facing() {
            tracing::warn!(session_id = %self.session.id(), error = %err, "turn rejected");
        } else {
            tracing::error!(session_id = %self.session.id(), error = %err, "turn failed");
        }
        self.events.emit(PipelineEvent::TurnFailed {
            message: err.to_string(),
        });
    }

    fn lock_transcript(&self) -> std::sync::MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_one_turn() {
        let gate = TurnGate::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let guard = gate.enter(&events).unwrap();
        assert!(gate.is_busy());
        assert!(matches!(gate.enter(&events), Err(Error::Busy)));

        drop(guard);
        assert!(!gate.is_busy());
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Busy);
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Idle);
    }
}
