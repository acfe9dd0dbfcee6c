//! Word-chain vocabulary game client
//!
//! The backend picks words and validates answers. The client enforces the
//! local rules: non-empty answers, three hints per word, and a per-answer
//! deadline that restarts after every correct answer. The game ends on the
//! first wrong answer or when the deadline passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::backend::{GameBackend, GameStartRequest, GameState, HintRequest, VerifyRequest};
use crate::pipeline::Narrator;
use crate::{Error, Result};

/// Hints available for each word
pub const MAX_HINTS: u32 = 3;

/// Why a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    WrongAnswer,
    TimedOut,
}

/// Outcome of one submitted answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub correct: bool,
    pub message: String,
    /// Word to continue from, if the backend supplied one
    pub new_word: Option<String>,
    pub score: u32,
    pub streak: u32,
    pub game_over: Option<GameOverReason>,
}

/// A hint for the current word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub text: String,
    pub possible_words: Vec<String>,
    pub hints_left: u32,
}

/// One running word-chain game
pub struct WordChain {
    backend: Arc<dyn GameBackend>,
    session_id: String,
    turn_limit: Duration,
    state: GameState,
    deadline: Instant,
    over: Option<GameOverReason>,
    narrator: Option<Narrator>,
}

impl WordChain {
    /// Start a game for `session_id`
    ///
    /// # Errors
    ///
    /// Returns error if the backend refuses to start a game
    pub async fn start(
        backend: Arc<dyn GameBackend>,
        session_id: impl Into<String>,
        difficulty: &str,
        turn_limit: Duration,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let state = backend
            .start_game(&GameStartRequest {
                session_id: session_id.clone(),
                difficulty: difficulty.to_string(),
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            difficulty,
            word = %state.current_word,
            "word chain started"
        );

        Ok(Self {
            backend,
            session_id,
            turn_limit,
            state,
            deadline: Instant::now() + turn_limit,
            over: None,
            narrator: None,
        })
    }

    /// Speak each new word through `narrator`
    #[must_use]
    pub fn with_narrator(mut self, narrator: Narrator) -> Self {
        self.narrator = Some(narrator);
        self
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub fn current_word(&self) -> &str {
        &self.state.current_word
    }

    #[must_use]
    pub const fn score(&self) -> u32 {
        self.state.score
    }

    #[must_use]
    pub const fn hints_left(&self) -> u32 {
        MAX_HINTS.saturating_sub(self.state.hint_count)
    }

    /// Time left for the current answer
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Reason the game ended, if it has
    #[must_use]
    pub const fn game_over(&self) -> Option<GameOverReason> {
        self.over
    }

    /// End the game if the answer deadline has passed
    pub fn check_timeout(&mut self) -> bool {
        if self.over.is_none() && Instant::now() >= self.deadline {
            tracing::info!(score = self.state.score, "word chain timed out");
            self.over = Some(GameOverReason::TimedOut);
        }
        self.over == Some(GameOverReason::TimedOut)
    }

    /// Speak the current word, if a narrator is attached
    ///
    /// Speech failures are logged and do not affect the game.
    pub async fn announce(&self) {
        let Some(narrator) = &self.narrator else {
            return;
        };
        if let Err(e) = narrator.speak(&self.state.current_word).await {
            tracing::warn!(word = %self.state.current_word, error = %e, "failed to speak word");
        }
    }

    /// Submit an answer for the current word
    ///
    /// # Errors
    ///
    /// Returns [`Error::Game`] for an empty answer or a finished game, or the
    /// backend error
    pub async fn submit(&mut self, answer: &str) -> Result<Verdict> {
        self.ensure_running()?;

        if self.check_timeout() {
            return Ok(self.verdict(false, "Time's up! Game over.".to_string(), None));
        }

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::Game("enter a word first".to_string()));
        }

        let result = self
            .backend
            .verify_answer(&VerifyRequest {
                session_id: self.session_id.clone(),
                answer: answer.to_string(),
            })
            .await?;

        if !result.correct {
            tracing::info!(answer, score = self.state.score, "wrong answer, game over");
            self.over = Some(GameOverReason::WrongAnswer);
            return Ok(self.verdict(false, result.message, None));
        }

        if let Some(word) = &result.new_word {
            self.state.current_word.clone_from(word);
            // Zero means "not reported"
            self.state.score = result.score.filter(|&s| s > 0).unwrap_or(self.state.score);
            self.state.streak = result.streak.filter(|&s| s > 0).unwrap_or(self.state.streak);
            self.state.hint_count = 0;
        }
        self.deadline = Instant::now() + self.turn_limit;

        tracing::debug!(
            answer,
            score = self.state.score,
            streak = self.state.streak,
            "answer accepted"
        );

        let verdict = self.verdict(true, result.message, result.new_word);
        if verdict.new_word.is_some() {
            self.announce().await;
        }
        Ok(verdict)
    }

    /// Ask for a hint about the current word
    ///
    /// # Errors
    ///
    /// Returns [`Error::Game`] when no hints are left or the game is over,
    /// or the backend error
    pub async fn hint(&mut self) -> Result<Hint> {
        self.ensure_running()?;
        if self.check_timeout() {
            return Err(Error::Game("time is up".to_string()));
        }
        if self.hints_left() == 0 {
            return Err(Error::Game(format!("all {MAX_HINTS} hints used for this word")));
        }

        let result = self
            .backend
            .hint(&HintRequest {
                session_id: self.session_id.clone(),
            })
            .await?;

        self.state.hint_count = result
            .hint_count
            .unwrap_or(self.state.hint_count + 1)
            .min(MAX_HINTS);

        Ok(Hint {
            text: result.hint,
            possible_words: result.possible_words,
            hints_left: self.hints_left(),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        match self.over {
            Some(_) => Err(Error::Game(format!(
                "game is over (final score {})",
                self.state.score
            ))),
            None => Ok(()),
        }
    }

    fn verdict(&self, correct: bool, message: String, new_word: Option<String>) -> Verdict {
        Verdict {
            correct,
            message,
            new_word,
            score: self.state.score,
            streak: self.state.streak,
            game_over: self.over,
        }
    }
}
