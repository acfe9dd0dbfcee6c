//! Append-only conversation transcript

use serde::{Deserialize, Serialize};

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "assistant")]
    Bot,
}

impl Sender {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

/// One entry of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub sender: Sender,
    pub text: String,
    #[serde(default)]
    pub sequence: u64,
}

/// Ordered, append-only list of turns
///
/// Sequence numbers are assigned on insertion and never change.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Rebuild a transcript from turns fetched from the backend
    ///
    /// Turns are kept in the given order and renumbered from zero.
    #[must_use]
    pub fn from_turns(turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        let mut transcript = Self::new();
        for turn in turns {
            transcript.push(turn.sender, turn.text);
        }
        transcript
    }

    /// Append a turn, returning it
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> &ConversationTurn {
        let sequence = self.turns.len() as u64;
        self.turns.push(ConversationTurn {
            sender,
            text: text.into(),
            sequence,
        });
        &self.turns[self.turns.len() - 1]
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_increasing_sequence() {
        let mut transcript = Transcript::new();
        transcript.push(Sender::User, "hello there");
        let bot = transcript.push(Sender::Bot, "Hi! How can I help?");
        assert_eq!(bot.sequence, 1);

        let senders: Vec<_> = transcript.turns().iter().map(|t| t.sender).collect();
        assert_eq!(senders, vec![Sender::User, Sender::Bot]);
    }

    #[test]
    fn from_turns_renumbers() {
        let turns: Vec<ConversationTurn> = serde_json::from_str(
            r#"[{"sender":"user","text":"a","sequence":7},{"sender":"assistant","text":"b"}]"#,
        )
        .unwrap();

        let transcript = Transcript::from_turns(turns);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].sequence, 0);
        assert_eq!(transcript.turns()[1].sender, Sender::Bot);
        assert_eq!(transcript.last().unwrap().text, "b");
    }

    #[test]
    fn serializes_lowercase_sender() {
        let turn = ConversationTurn {
            sender: Sender::Bot,
            text: "hi".into(),
            sequence: 0,
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["sender"], "bot");
    }
}
