//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::{Notify, oneshot};

use lingo_voice::backend::{
    ChatRequest, GameStartRequest, GameState, HintRequest, HintResult, SttRequest, TtsRequest,
    VerifyRequest, VerifyResult,
};
use lingo_voice::voice::{
    AudioAsset, AudioSink, CaptureMode, Capturer, DecodedClip, PlaybackHandle, SampleCallback,
    SampleSource, samples_to_wav,
};
use lingo_voice::{Backend, ConversationTurn, Error, GameBackend, Result, Stage};

/// Canned answer for one backend call
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    /// "currently loading" with an optional `estimated_time` in seconds
    Loading(Option<u64>),
    Fail(String),
}

impl Reply {
    pub fn ok(text: &str) -> Self {
        Self::Ok(text.to_string())
    }

    fn into_result(self, stage: Stage) -> Result<String> {
        match self {
            Self::Ok(text) => Ok(text),
            Self::Loading(secs) => Err(Error::ModelLoading {
                stage,
                estimated_time: secs.map(Duration::from_secs),
            }),
            Self::Fail(message) => Err(Error::remote(stage, Some(500), message)),
        }
    }
}

/// Backend answering from per-stage scripts and recording every request
#[derive(Default)]
pub struct ScriptedBackend {
    stt: Mutex<VecDeque<Reply>>,
    chat: Mutex<VecDeque<Reply>>,
    tts: Mutex<VecDeque<Reply>>,
    pub stt_requests: Mutex<Vec<SttRequest>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub tts_requests: Mutex<Vec<TtsRequest>>,
    pub deletes: Mutex<Vec<String>>,
    /// Stage names in call order
    pub calls: Mutex<Vec<&'static str>>,
    history: Mutex<Vec<ConversationTurn>>,
    stt_gate: Option<Arc<Notify>>,
    fail_deletes: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stt(self, reply: Reply) -> Self {
        self.stt.lock().unwrap().push_back(reply);
        self
    }

    pub fn chat(self, reply: Reply) -> Self {
        self.chat.lock().unwrap().push_back(reply);
        self
    }

    pub fn tts(self, reply: Reply) -> Self {
        self.tts.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_history(self, turns: Vec<ConversationTurn>) -> Self {
        *self.history.lock().unwrap() = turns;
        self
    }

    /// Hold STT requests until `gate` is notified
    pub fn gate_stt(mut self, gate: Arc<Notify>) -> Self {
        self.stt_gate = Some(gate);
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn next(queue: &Mutex<VecDeque<Reply>>) -> Reply {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Fail("unscripted call".to_string()))
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn transcribe(&self, request: &SttRequest) -> Result<String> {
        self.calls.lock().unwrap().push("stt");
        self.stt_requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.stt_gate {
            gate.notified().await;
        }
        Self::next(&self.stt).into_result(Stage::Stt)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        self.calls.lock().unwrap().push("chat");
        self.chat_requests.lock().unwrap().push(request.clone());
        Self::next(&self.chat).into_result(Stage::Chat)
    }

    async fn synthesize(&self, request: &TtsRequest) -> Result<String> {
        self.calls.lock().unwrap().push("tts");
        self.tts_requests.lock().unwrap().push(request.clone());
        Self::next(&self.tts).into_result(Stage::Tts)
    }

    async fn session_history(&self, _session_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(session_id.to_string());
        if self.fail_deletes {
            return Err(Error::remote(Stage::Session, Some(500), "boom"));
        }
        Ok(())
    }
}

/// Game backend answering from scripted results
#[derive(Default)]
pub struct ScriptedGame {
    pub start_state: Mutex<Option<GameState>>,
    verdicts: Mutex<VecDeque<VerifyResult>>,
    hints: Mutex<VecDeque<HintResult>>,
    pub answers: Mutex<Vec<String>>,
    pub hint_requests: AtomicUsize,
    pub difficulties: Mutex<Vec<String>>,
}

impl ScriptedGame {
    pub fn starting_with(word: &str) -> Self {
        let game = Self::default();
        *game.start_state.lock().unwrap() = Some(GameState {
            current_word: word.to_string(),
            hint_count: 0,
            difficulty: "basic".to_string(),
            score: 0,
            streak: 0,
        });
        game
    }

    pub fn verdict(self, result: VerifyResult) -> Self {
        self.verdicts.lock().unwrap().push_back(result);
        self
    }

    pub fn hint(self, result: HintResult) -> Self {
        self.hints.lock().unwrap().push_back(result);
        self
    }
}

#[async_trait]
impl GameBackend for ScriptedGame {
    async fn start_game(&self, request: &GameStartRequest) -> Result<GameState> {
        self.difficulties
            .lock()
            .unwrap()
            .push(request.difficulty.clone());
        self.start_state
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::remote(Stage::Game, Some(500), "no game"))
    }

    async fn verify_answer(&self, request: &VerifyRequest) -> Result<VerifyResult> {
        self.answers.lock().unwrap().push(request.answer.clone());
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::remote(Stage::Game, Some(500), "unscripted verify"))
    }

    async fn hint(&self, _request: &HintRequest) -> Result<HintResult> {
        self.hint_requests.fetch_add(1, Ordering::SeqCst);
        self.hints
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::remote(Stage::Game, Some(500), "unscripted hint"))
    }
}

pub fn correct(new_word: &str, score: Option<u32>, streak: Option<u32>) -> VerifyResult {
    VerifyResult {
        correct: true,
        new_word: Some(new_word.to_string()),
        message: "Correct!".to_string(),
        score,
        streak,
    }
}

pub fn wrong(message: &str) -> VerifyResult {
    VerifyResult {
        correct: false,
        new_word: None,
        message: message.to_string(),
        score: None,
        streak: None,
    }
}

/// Capturer that hands out a prepared asset
pub struct FakeCapturer {
    asset: AudioAsset,
    active: bool,
    pub starts: Arc<AtomicUsize>,
}

impl FakeCapturer {
    pub fn with_asset(asset: AudioAsset) -> Self {
        Self {
            asset,
            active: false,
            starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Capturer producing `len` bytes of fake audio
    pub fn with_bytes(len: usize) -> Self {
        Self::with_asset(AudioAsset::new(vec![7u8; len], "audio/wav"))
    }
}

impl Capturer for FakeCapturer {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Buffered
    }

    fn start(&mut self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioAsset> {
        if !self.active {
            return Err(Error::NoActiveCapture);
        }
        self.active = false;
        if self.asset.is_empty() {
            return Err(Error::EmptyCapture);
        }
        Ok(self.asset.clone())
    }

    fn is_capturing(&self) -> bool {
        self.active
    }
}

/// Capturer whose microphone is unavailable
pub struct DeniedCapturer;

impl Capturer for DeniedCapturer {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Chunked
    }

    fn start(&mut self) -> Result<()> {
        Err(Error::PermissionDenied("no input device available".to_string()))
    }

    fn stop(&mut self) -> Result<AudioAsset> {
        Err(Error::NoActiveCapture)
    }

    fn is_capturing(&self) -> bool {
        false
    }
}

/// Counters shared between a [`RecordingSink`] and the test
#[derive(Default)]
pub struct SinkStats {
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub clip_lengths: Mutex<Vec<usize>>,
}

/// Sink that "plays" each clip for `clip_time` on the tokio clock
pub struct RecordingSink {
    pub stats: Arc<SinkStats>,
    clip_time: Duration,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<SinkStats>) {
        Self::playing_for(Duration::ZERO)
    }

    pub fn playing_for(clip_time: Duration) -> (Self, Arc<SinkStats>) {
        let stats = Arc::new(SinkStats::default());
        (
            Self {
                stats: Arc::clone(&stats),
                clip_time,
                fail: false,
            },
            stats,
        )
    }

    pub fn failing() -> (Self, Arc<SinkStats>) {
        let (mut sink, stats) = Self::new();
        sink.fail = true;
        (sink, stats)
    }
}

impl AudioSink for RecordingSink {
    fn start(&mut self, clip: &DecodedClip) -> Result<PlaybackHandle> {
        if self.fail {
            return Err(Error::Audio("output device unavailable".to_string()));
        }

        self.stats.started.fetch_add(1, Ordering::SeqCst);
        self.stats
            .clip_lengths
            .lock()
            .unwrap()
            .push(clip.samples.len());
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        let stats = Arc::clone(&self.stats);
        let clip_time = self.clip_time;
        tokio::spawn(async move {
            tokio::time::sleep(clip_time).await;
            stats.active.fetch_sub(1, Ordering::SeqCst);
            stats.finished.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });

        Ok(PlaybackHandle::new(rx, clip_time))
    }
}

/// Sample source delivering prepared frames as soon as it is opened
pub struct ScriptedSource {
    rate: u32,
    frames: Vec<Vec<f32>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(rate: u32, frames: Vec<Vec<f32>>) -> Self {
        Self {
            rate,
            frames,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn silent(rate: u32) -> Self {
        Self::new(rate, Vec::new())
    }
}

impl SampleSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn open(&mut self, mut on_samples: SampleCallback) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        for frame in &self.frames {
            on_samples(frame);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss)]
pub fn sine(frequency: f32, samples: usize, rate: u32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / rate as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Base64 WAV payload as returned by the TTS endpoint (0.1s at 24kHz)
pub fn tts_payload() -> String {
    STANDARD.encode(samples_to_wav(&sine(220.0, 2400, 24000), 24000).expect("wav encoding"))
}
