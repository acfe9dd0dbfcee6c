//! Audio playback to speakers
//!
//! [`Playback`] owns the output sink and the speaking flag. Clips are played
//! one at a time in request order; the flag is raised only once a sink has
//! actually started and is lowered when the clip ends.

use std::any::Any;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::{Mutex, oneshot, watch};

use super::codec::{AudioCodec, PlayableAsset};
use super::resample::resample;
use crate::events::{EventBus, PipelineEvent};
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Extra time allowed past the clip length before giving up on a sink
const COMPLETION_GRACE: Duration = Duration::from_millis(500);

/// Mono PCM ready for output
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedClip {
    /// Playing time of the clip
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Decode a playable asset, sniffing WAV or MP3 from its bytes
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the bytes are neither WAV nor MP3
pub fn decode_clip(asset: &PlayableAsset) -> Result<DecodedClip> {
    let bytes = asset.bytes.as_slice();

    if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)
    } else if bytes.starts_with(b"ID3")
        || bytes.first() == Some(&0xFF)
        || asset.mime.contains("mpeg")
    {
        decode_mp3(bytes)
    } else {
        Err(Error::MalformedPayload(format!(
            "unsupported audio format ({}, {} bytes)",
            asset.mime,
            bytes.len()
        )))
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<DecodedClip> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::MalformedPayload(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<std::result::Result<_, _>>()
        }
    }
    .map_err(|e| Error::MalformedPayload(format!("WAV decode error: {e}")))?;

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(DecodedClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::MalformedPayload(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

/// Completion signal of one started clip
///
/// Holds whatever keeps the clip audible (an output stream) until awaited.
pub struct PlaybackHandle {
    done: oneshot::Receiver<()>,
    limit: Duration,
    #[allow(dead_code)]
    keep_alive: Option<Box<dyn Any>>,
}

impl PlaybackHandle {
    /// Handle completing when `done` fires, or at the latest after `limit`
    /// plus a short grace period
    #[must_use]
    pub fn new(done: oneshot::Receiver<()>, limit: Duration) -> Self {
        Self {
            done,
            limit,
            keep_alive: None,
        }
    }

    /// Keep `resource` alive until the clip finishes
    #[must_use]
    pub fn holding(mut self, resource: impl Any) -> Self {
        self.keep_alive = Some(Box::new(resource));
        self
    }

    /// A handle for a clip that has already finished
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self::new(rx, Duration::ZERO)
    }

    /// Wait for the clip to end; `false` if it was cut short or timed out
    pub async fn wait(self) -> bool {
        matches!(
            tokio::time::timeout(self.limit + COMPLETION_GRACE, self.done).await,
            Ok(Ok(()))
        )
    }
}

/// Audio output device
pub trait AudioSink {
    /// Begin playing `clip`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if playback cannot start
    fn start(&mut self, clip: &DecodedClip) -> Result<PlaybackHandle>;
}

/// Default output device as an [`AudioSink`]
pub struct SpeakerOutput {
    device: Device,
    config: StreamConfig,
}

impl SpeakerOutput {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let preferred = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .map(|c| c.with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE)).config());

        let config = match preferred {
            Some(config) => config,
            None => device
                .default_output_config()
                .map_err(|e| Error::Audio(e.to_string()))?
                .config(),
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }
}

impl AudioSink for SpeakerOutput {
    fn start(&mut self, clip: &DecodedClip) -> Result<PlaybackHandle> {
        let rate = self.config.sample_rate.0;
        let samples = if clip.sample_rate == rate {
            clip.samples.clone()
        } else {
            resample(&clip.samples, clip.sample_rate, rate)?
        };
        let limit = clip.duration();

        let channels = usize::from(self.config.channels.max(1));
        let (done_tx, done_rx) = oneshot::channel();
        let mut done_tx = Some(done_tx);
        let mut position = 0usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(position).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        position += 1;
                    }
                    if position >= samples.len()
                        && let Some(tx) = done_tx.take()
                    {
                        let _ = tx.send(());
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(PlaybackHandle::new(done_rx, limit).holding(stream))
    }
}

/// Plays synthesized speech and publishes the speaking flag
pub struct Playback {
    sink: Mutex<Box<dyn AudioSink>>,
    codec: Arc<dyn AudioCodec>,
    speaking: watch::Sender<bool>,
    events: EventBus,
}

impl Playback {
    pub fn new(sink: Box<dyn AudioSink>, codec: Arc<dyn AudioCodec>, events: EventBus) -> Self {
        let (speaking, _) = watch::channel(false);
        Self {
            sink: Mutex::new(sink),
            codec,
            speaking,
            events,
        }
    }

    /// Receiver of the speaking flag
    #[must_use]
    pub fn speaking(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    /// Decode a base64 payload and play it to completion
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] for undecodable audio and
    /// [`Error::Audio`] if the sink fails to start
    pub async fn play(&self, payload: &str, mime: &str) -> Result<()> {
        let asset = self.codec.from_base64(payload, mime)?;
        self.play_asset(&asset).await
    }

    /// Play an already decoded asset to completion
    ///
    /// Overlapping calls queue behind the one currently playing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] for undecodable audio and
    /// [`Error::Audio`] if the sink fails to start
    pub async fn play_asset(&self, asset: &PlayableAsset) -> Result<()> {
        let clip = decode_clip(asset)?;
        if clip.samples.is_empty() {
            tracing::debug!("empty clip, nothing to play");
            return Ok(());
        }

        let mut sink = self.sink.lock().await;
        let handle = sink.start(&clip)?;

        let speaking = SpeakingGuard::raise(&self.speaking, &self.events);
        tracing::debug!(
            samples = clip.samples.len(),
            duration_ms = clip.duration().as_millis(),
            "playback started"
        );

        if !handle.wait().await {
            tracing::warn!("playback did not signal completion");
        }

        drop(speaking);
        tracing::debug!("playback complete");

        drop(sink);
        Ok(())
    }
}

/// Holds the speaking flag up until dropped, even if playback is abandoned
struct SpeakingGuard<'a> {
    flag: &'a watch::Sender<bool>,
    events: &'a EventBus,
}

impl<'a> SpeakingGuard<'a> {
    fn raise(flag: &'a watch::Sender<bool>, events: &'a EventBus) -> Self {
        flag.send_replace(true);
        events.emit(PipelineEvent::SpeakingStarted);
        Self { flag, events }
    }
}

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.flag.send_replace(false);
        self.events.emit(PipelineEvent::SpeakingFinished);
    }
}
