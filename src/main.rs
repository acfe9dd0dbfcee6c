use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

use lingo_voice::speakers::{self, catalog};
use lingo_voice::voice::{
    AudioSink, Base64Codec, DecodedClip, Microphone, Playback, SampleSource, SpeakerOutput,
    default_capturer,
};
use lingo_voice::{
    Backend, ChatSession, Config, EventBus, GameBackend, GameOverReason, HttpBackend, Narrator,
    PipelineEvent, Session, Strategy, Transcript, VoiceChat, WordChain,
};

/// How long to let the session deletion run before the process exits
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lingo - voice conversation practice against the language-learning API
#[derive(Parser)]
#[command(name = "lingo", version, about)]
struct Cli {
    /// Base URL of the backend API
    #[arg(long, env = "LINGO_API_BASE_URL")]
    api_url: Option<String>,

    /// TTS speaker id (see `lingo speakers`)
    #[arg(short, long)]
    speaker: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Text chat with the tutor
    Chat {
        /// Reply style: default or casual
        #[arg(long)]
        strategy: Option<Strategy>,
    },
    /// Voice chat: press Enter to start and stop recording
    Voice {
        /// Reply style: default or casual
        #[arg(long)]
        strategy: Option<Strategy>,
    },
    /// List available speakers
    Speakers,
    /// Play the word-chain game
    Game {
        /// Word difficulty
        #[arg(short, long)]
        difficulty: Option<String>,
    },
    /// Show the server-side transcript of a session
    History {
        /// Session id
        session_id: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "warn,lingo_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Speakers => {
            list_speakers(cli.speaker.as_deref());
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Chat { strategy } => {
            let config = load_config(cli.api_url, cli.speaker)?;
            chat(&config, strategy).await
        }
        Command::Voice { strategy } => {
            let config = load_config(cli.api_url, cli.speaker)?;
            voice(&config, strategy).await
        }
        Command::Game { difficulty } => {
            let config = load_config(cli.api_url, cli.speaker)?;
            game(&config, difficulty).await
        }
        Command::History { session_id } => {
            let config = load_config(cli.api_url, cli.speaker)?;
            history(&config, &session_id).await
        }
        Command::TestTts { text } => {
            let config = load_config(cli.api_url, cli.speaker)?;
            test_tts(&config, &text).await
        }
    }
}

/// Load configuration with command-line flags taking precedence
fn load_config(api_url: Option<String>, speaker: Option<String>) -> anyhow::Result<Config> {
    let config = Config::load(|key| match key {
        "LINGO_API_BASE_URL" => api_url.clone(),
        "LINGO_SPEAKER" => speaker.clone(),
        _ => None,
    })?;

    // Reject unknown speakers before any request is made
    speakers::resolve(&config.voice.speaker)?;

    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Print pipeline status changes until the bus closes
fn spawn_status_printer(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(
                    event @ (PipelineEvent::ModelLoading { .. }
                    | PipelineEvent::SpeakingStarted
                    | PipelineEvent::TurnFailed { .. }),
                ) => println!("  [{}]", event.describe()),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "status printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Give a detached session deletion a moment to reach the server
async fn finish_teardown(handle: Option<tokio::task::JoinHandle<()>>) {
    if let Some(handle) = handle
        && tokio::time::timeout(TEARDOWN_GRACE, handle).await.is_err()
    {
        tracing::debug!("session deletion still pending at exit");
    }
}

fn list_speakers(selected: Option<&str>) {
    let selected = selected.unwrap_or(speakers::DEFAULT_SPEAKER);

    for speaker in catalog() {
        let marker = if speaker.id == selected { "*" } else { " " };
        println!(
            "{marker} {} {:<8} {} ({}, {})",
            speaker.id, speaker.label, speaker.description, speaker.mood, speaker.color
        );
        for line in speaker.meters().lines() {
            println!("      {line}");
        }
        println!();
    }
}

/// Interactive text chat
#[allow(clippy::future_not_send)]
async fn chat(config: &Config, strategy: Option<Strategy>) -> anyhow::Result<()> {
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::from_config(config)?);
    let events = EventBus::default();
    let printer = spawn_status_printer(&events);

    let session = ChatSession::new(backend, events)
        .with_strategy(strategy.unwrap_or(config.chat.strategy));

    println!("Session {} (type /history or /quit)", session.session_id());

    let mut lines = stdin_lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            "/history" => {
                for turn in session.transcript() {
                    println!("{:>3} {}: {}", turn.sequence, turn.sender.as_str(), turn.text);
                }
            }
            text => {
                if let Ok(reply) = session.send_text(text).await {
                    println!("bot> {reply}");
                }
            }
        }
    }

    finish_teardown(session.close()).await;
    printer.abort();
    Ok(())
}

/// Interactive voice chat
#[allow(clippy::future_not_send)]
async fn voice(config: &Config, strategy: Option<Strategy>) -> anyhow::Result<()> {
    let http = Arc::new(HttpBackend::from_config(config)?);
    let backend: Arc<dyn Backend> = http;
    let events = EventBus::default();
    let printer = spawn_status_printer(&events);

    let capturer = default_capturer(config.voice.capture)?;
    let playback = Playback::new(
        Box::new(SpeakerOutput::new()?),
        Arc::new(Base64Codec),
        events.clone(),
    );
    let narrator = Narrator::new(Arc::clone(&backend), playback, events.clone())
        .with_speaker(config.voice.speaker.clone())
        .with_retry(config.retry.clone());
    let session = ChatSession::new(backend, events)
        .with_strategy(strategy.unwrap_or(config.chat.strategy));

    let voice = VoiceChat::new(session, capturer, narrator);

    println!(
        "Session {} with speaker {} ({:?} capture)",
        voice.session_id(),
        voice.narrator().speaker(),
        voice.capture_mode()
    );
    println!("Press Enter to start recording, Enter again to send. Type q to quit.");

    let mut lines = stdin_lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "q" {
            break;
        }

        if voice.is_capturing() {
            match voice.finish_turn().await {
                Ok(outcome) => {
                    println!("you> {}", outcome.user_text);
                    println!("bot> {}", outcome.bot_text);
                }
                Err(e) => tracing::debug!(error = %e, "turn ended without reply"),
            }
            println!("Press Enter to record.");
        } else if voice.start_capture().is_ok() {
            println!("Recording... press Enter to send.");
        }
    }

    finish_teardown(voice.close()).await;
    printer.abort();
    Ok(())
}

/// Word-chain game loop
#[allow(clippy::future_not_send)]
async fn game(config: &Config, difficulty: Option<String>) -> anyhow::Result<()> {
    let http = Arc::new(HttpBackend::from_config(config)?);
    let backend: Arc<dyn Backend> = Arc::clone(&http) as Arc<dyn Backend>;
    let game_backend: Arc<dyn GameBackend> = http;
    let events = EventBus::default();
    let printer = spawn_status_printer(&events);

    let session = Session::new(Arc::clone(&backend));
    let difficulty = difficulty.unwrap_or_else(|| config.game.difficulty.clone());

    let mut game = WordChain::start(
        game_backend,
        session.id(),
        &difficulty,
        config.game.turn_limit,
    )
    .await?;

    match SpeakerOutput::new() {
        Ok(sink) => {
            let playback = Playback::new(Box::new(sink), Arc::new(Base64Codec), events.clone());
            let narrator = Narrator::new(backend, playback, events)
                .with_speaker(config.voice.speaker.clone())
                .with_retry(config.retry.clone());
            game = game.with_narrator(narrator);
        }
        Err(e) => tracing::warn!(error = %e, "no audio output, words will not be spoken"),
    }

    println!("Word chain ({difficulty}). Type /hint for a hint, /quit to stop.");
    println!("Word: {}", game.current_word());
    game.announce().await;

    let mut lines = stdin_lines();
    loop {
        println!(
            "[{}s left, score {}, {} hints left] > ",
            game.remaining().as_secs(),
            game.score(),
            game.hints_left()
        );

        let line = match tokio::time::timeout(game.remaining(), lines.next_line()).await {
            Ok(line) => line?,
            Err(_) => {
                game.check_timeout();
                None
            }
        };

        if game.check_timeout() {
            println!("Time's up! Game over. Final score: {}", game.score());
            break;
        }
        let Some(line) = line else { break };

        match line.trim() {
            "/quit" => break,
            "/hint" => match game.hint().await {
                Ok(hint) => {
                    println!("Hint: {}", hint.text);
                    if !hint.possible_words.is_empty() {
                        println!("  e.g. {}", hint.possible_words.join(", "));
                    }
                }
                Err(e) => println!("{e}"),
            },
            answer => match game.submit(answer).await {
                Ok(verdict) => {
                    println!("{}", verdict.message);
                    match verdict.game_over {
                        Some(GameOverReason::WrongAnswer | GameOverReason::TimedOut) => {
                            println!("Game over. Final score: {}", verdict.score);
                            break;
                        }
                        None => {
                            if let Some(word) = verdict.new_word {
                                println!("Word: {word}");
                            }
                        }
                    }
                }
                Err(e) => println!("{e}"),
            },
        }
    }

    finish_teardown(session.teardown()).await;
    printer.abort();
    Ok(())
}

async fn history(config: &Config, session_id: &str) -> anyhow::Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let transcript = Transcript::from_turns(backend.session_history(session_id).await?);

    if transcript.is_empty() {
        println!("No messages in session {session_id}");
    }
    for turn in transcript.turns() {
        println!("{:>3} {}: {}", turn.sequence, turn.sender.as_str(), turn.text);
    }
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut microphone = Microphone::new()?;
    println!("Sample rate: {} Hz", microphone.sample_rate());
    println!(
        "Speech format: {}",
        if microphone.supports_speech_format() {
            "native (buffered capture)"
        } else {
            "converted (chunked capture)"
        }
    );
    println!("---");

    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = Arc::clone(&buffer);
    microphone.open(Box::new(move |data| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
    }))?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    microphone.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check your input device and its levels.");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut output = SpeakerOutput::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let clip = DecodedClip {
        samples,
        sample_rate,
    };
    if !output.start(&clip)?.wait().await {
        println!("Playback did not report completion.");
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output through the backend
#[allow(clippy::future_not_send)]
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!(
        "Testing TTS with speaker {} and text: \"{text}\"\n",
        config.voice.speaker
    );

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::from_config(config)?);
    let events = EventBus::default();
    let printer = spawn_status_printer(&events);

    let playback = Playback::new(
        Box::new(SpeakerOutput::new()?),
        Arc::new(Base64Codec),
        events.clone(),
    );
    let narrator = Narrator::new(backend, playback, events)
        .with_speaker(config.voice.speaker.clone())
        .with_retry(config.retry.clone());

    println!("Synthesizing speech...");
    narrator.speak(text).await?;

    printer.abort();
    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
