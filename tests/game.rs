//! Word-chain game integration tests

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use lingo_voice::backend::HintResult;
use lingo_voice::voice::{Base64Codec, Playback};
use lingo_voice::{
    Backend, Error, EventBus, GameBackend, GameOverReason, MAX_HINTS, Narrator, WordChain,
};

mod common;

use common::{RecordingSink, Reply, ScriptedBackend, ScriptedGame, correct, tts_payload, wrong};

const TURN_LIMIT: Duration = Duration::from_secs(30);

async fn start(game: ScriptedGame) -> (WordChain, Arc<ScriptedGame>) {
    let game = Arc::new(game);
    let chain = WordChain::start(
        Arc::clone(&game) as Arc<dyn GameBackend>,
        "session-1",
        "basic",
        TURN_LIMIT,
    )
    .await
    .unwrap();
    (chain, game)
}

fn hint(text: &str, count: Option<u32>) -> HintResult {
    HintResult {
        hint: text.to_string(),
        possible_words: Vec::new(),
        hint_count: count,
    }
}

#[tokio::test]
async fn test_start_uses_difficulty_and_first_word() {
    let (chain, game) = start(ScriptedGame::starting_with("apple")).await;

    assert_eq!(chain.current_word(), "apple");
    assert_eq!(chain.score(), 0);
    assert_eq!(chain.hints_left(), MAX_HINTS);
    assert_eq!(chain.game_over(), None);
    assert_eq!(*game.difficulties.lock().unwrap(), vec!["basic".to_string()]);
}

#[tokio::test]
async fn test_correct_answer_advances_word() {
    let (mut chain, game) = start(
        ScriptedGame::starting_with("apple").verdict(correct("egg", Some(10), Some(1))),
    )
    .await;

    let verdict = chain.submit("  egg ").await.unwrap();

    assert!(verdict.correct);
    assert_eq!(verdict.new_word.as_deref(), Some("egg"));
    assert_eq!(verdict.score, 10);
    assert_eq!(verdict.streak, 1);
    assert_eq!(verdict.game_over, None);
    assert_eq!(chain.current_word(), "egg");
    assert_eq!(*game.answers.lock().unwrap(), vec!["egg".to_string()]);
}

#[tokio::test]
async fn test_unreported_score_keeps_previous_value() {
    let (mut chain, _game) = start(
        ScriptedGame::starting_with("apple")
            .verdict(correct("egg", Some(10), Some(1)))
            .verdict(correct("goat", Some(0), None)),
    )
    .await;

    chain.submit("egg").await.unwrap();
    let verdict = chain.submit("goat").await.unwrap();

    assert_eq!(verdict.score, 10);
    assert_eq!(verdict.streak, 1);
    assert_eq!(chain.current_word(), "goat");
}

#[tokio::test]
async fn test_wrong_answer_ends_game() {
    let (mut chain, game) = start(
        ScriptedGame::starting_with("apple").verdict(wrong("'dog' does not start with 'e'")),
    )
    .await;

    let verdict = chain.submit("dog").await.unwrap();

    assert!(!verdict.correct);
    assert_eq!(verdict.message, "'dog' does not start with 'e'");
    assert_eq!(verdict.game_over, Some(GameOverReason::WrongAnswer));
    assert_eq!(chain.current_word(), "apple");

    let err = assert_err!(chain.submit("egg").await);
    assert!(matches!(err, Error::Game(_)));
    assert!(matches!(chain.hint().await, Err(Error::Game(_))));
    assert_eq!(game.answers.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_answer_is_rejected_locally() {
    let (mut chain, game) = start(ScriptedGame::starting_with("apple")).await;

    let err = assert_err!(chain.submit("   ").await);

    assert!(matches!(err, Error::Game(_)));
    assert!(err.is_user_facing());
    assert!(game.answers.lock().unwrap().is_empty());
    assert_eq!(chain.game_over(), None);
}

#[tokio::test]
async fn test_hints_are_capped_per_word() {
    let (mut chain, game) = start(
        ScriptedGame::starting_with("apple")
            .hint(hint("Starts with 'e'", Some(1)))
            .hint(hint("Something you eat", None))
            .hint(hint("Three letters", Some(3)))
            .verdict(correct("egg", Some(5), Some(1)))
            .hint(hint("Starts with 'g'", Some(1))),
    )
    .await;

    assert_eq!(chain.hint().await.unwrap().hints_left, 2);
    assert_eq!(chain.hint().await.unwrap().hints_left, 1);
    let last = chain.hint().await.unwrap();
    assert_eq!(last.text, "Three letters");
    assert_eq!(last.hints_left, 0);

    let err = chain.hint().await.unwrap_err();
    assert!(matches!(err, Error::Game(_)));
    assert_eq!(game.hint_requests.load(Ordering::SeqCst), 3);

    // A new word restores the hint budget
    chain.submit("egg").await.unwrap();
    assert_eq!(chain.hints_left(), MAX_HINTS);
    assert_eq!(chain.hint().await.unwrap().hints_left, 2);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_ends_game() {
    let (mut chain, game) = start(ScriptedGame::starting_with("apple")).await;

    tokio::time::advance(TURN_LIMIT + Duration::from_secs(1)).await;

    assert_eq!(chain.remaining(), Duration::ZERO);
    let verdict = chain.submit("egg").await.unwrap();

    assert!(!verdict.correct);
    assert_eq!(verdict.message, "Time's up! Game over.");
    assert_eq!(verdict.game_over, Some(GameOverReason::TimedOut));
    assert!(game.answers.lock().unwrap().is_empty());
    assert!(matches!(chain.submit("egg").await, Err(Error::Game(_))));
}

#[tokio::test(start_paused = true)]
async fn test_correct_answer_restarts_deadline() {
    let (mut chain, _game) = start(
        ScriptedGame::starting_with("apple").verdict(correct("egg", Some(10), Some(1))),
    )
    .await;

    tokio::time::advance(Duration::from_secs(25)).await;
    chain.submit("egg").await.unwrap();
    assert_eq!(chain.remaining(), TURN_LIMIT);

    tokio::time::advance(Duration::from_secs(25)).await;
    assert!(!chain.check_timeout());
    assert_eq!(chain.game_over(), None);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(chain.check_timeout());
    assert_eq!(chain.game_over(), Some(GameOverReason::TimedOut));
}

#[tokio::test]
async fn test_new_word_is_spoken() {
    let backend: Arc<dyn Backend> =
        Arc::new(ScriptedBackend::new().tts(Reply::Ok(tts_payload())));
    let bus = EventBus::default();
    let (sink, stats) = RecordingSink::new();
    let playback = Playback::new(Box::new(sink), Arc::new(Base64Codec), bus.clone());
    let narrator = Narrator::new(backend, playback, bus);

    let (chain, _game) = start(
        ScriptedGame::starting_with("apple").verdict(correct("egg", Some(10), Some(1))),
    )
    .await;
    let mut chain = chain.with_narrator(narrator);

    chain.submit("egg").await.unwrap();

    assert_eq!(stats.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_speech_failure_does_not_affect_game() {
    // Unscripted TTS calls fail
    let backend: Arc<dyn Backend> = Arc::new(ScriptedBackend::new());
    let bus = EventBus::default();
    let (sink, stats) = RecordingSink::new();
    let playback = Playback::new(Box::new(sink), Arc::new(Base64Codec), bus.clone());
    let narrator = Narrator::new(backend, playback, bus);

    let (chain, _game) = start(
        ScriptedGame::starting_with("apple").verdict(correct("egg", Some(10), Some(1))),
    )
    .await;
    let mut chain = chain.with_narrator(narrator);

    let verdict = assert_ok!(chain.submit("egg").await);

    assert!(verdict.correct);
    assert_eq!(chain.current_word(), "egg");
    assert_eq!(stats.started.load(Ordering::SeqCst), 0);
}
