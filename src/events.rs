//! Pipeline state events for the presentation layer
//!
//! Publishing is best-effort: with no subscribers, events are dropped.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::backend::Stage;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 64;

/// Observable state change of a conversation surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A turn started; capture controls should be disabled
    Busy,
    /// The turn finished (successfully or not)
    Idle,
    /// A model is loading and the stage will be retried after `estimate`
    ModelLoading { stage: Stage, estimate: Duration },
    /// Speech recognized for the user turn
    Transcribed { text: String },
    /// Bot reply received
    Replied { text: String },
    /// Audio playback started
    SpeakingStarted,
    /// Audio playback finished
    SpeakingFinished,
    /// A turn was aborted; `message` is meant for a banner
    TurnFailed { message: String },
}

impl PipelineEvent {
    /// Human-readable status line
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Busy => "processing...".to_string(),
            Self::Idle => "ready".to_string(),
            Self::ModelLoading { stage, estimate } => format!(
                "{stage} model is loading, retrying in about {} seconds",
                estimate.as_secs()
            ),
            Self::Transcribed { text } => format!("you: {text}"),
            Self::Replied { text } => format!("bot: {text}"),
            Self::SpeakingStarted => "speaking...".to_string(),
            Self::SpeakingFinished => "done speaking".to_string(),
            Self::TurnFailed { message } => format!("error: {message}"),
        }
    }
}

/// Broadcast channel of [`PipelineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event
    pub fn emit(&self, event: PipelineEvent) {
        tracing::trace!(?event, "pipeline event");
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_silent() {
        EventBus::default().emit(PipelineEvent::Busy);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.emit(PipelineEvent::Busy);
        bus.emit(PipelineEvent::Idle);

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Busy);
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Idle);
    }

    #[test]
    fn loading_description_mentions_estimate() {
        let event = PipelineEvent::ModelLoading {
            stage: Stage::Tts,
            estimate: Duration::from_secs(5),
        };
        assert_eq!(
            event.describe(),
            "TTS model is loading, retrying in about 5 seconds"
        );
    }
}
