//! Microphone capture
//!
//! A [`Capturer`] turns one start/stop cycle into one sealed [`AudioAsset`].
//! Two variants exist and exactly one is chosen when the surface is built:
//!
//! - [`BufferedCapturer`] keeps every sample in one growing buffer, used when
//!   the input device records directly in the speech format
//! - [`ChunkedCapturer`] seals ~500ms PCM chunks into an ordered list and
//!   joins them on stop, used when the device runs at its native format

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::codec::{AudioAsset, WAV_MIME};
use super::resample::resample;
use crate::{Error, Result};

/// Sample rate for speech audio (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Period at which [`ChunkedCapturer`] seals chunks
pub const CHUNK_PERIOD: Duration = Duration::from_millis(500);

/// Receives mono f32 samples from a [`SampleSource`]
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Something that delivers mono samples between `open` and `close`
pub trait SampleSource {
    /// Rate of the delivered samples
    fn sample_rate(&self) -> u32;

    /// Begin delivering samples to `on_samples`
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the device cannot be acquired
    fn open(&mut self, on_samples: SampleCallback) -> Result<()>;

    /// Stop delivering samples and release the device
    fn close(&mut self);
}

/// Capture variant in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Buffered,
    Chunked,
}

/// Configured capture variant; `Auto` decides from device capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapturePreference {
    #[default]
    Auto,
    Buffered,
    Chunked,
}

impl FromStr for CapturePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "buffered" => Ok(Self::Buffered),
            "chunked" => Ok(Self::Chunked),
            other => Err(Error::Config(format!(
                "unknown capture mode '{other}' (expected auto, buffered or chunked)"
            ))),
        }
    }
}

impl CapturePreference {
    /// Resolve to a concrete mode given whether the device records speech
    /// format natively
    #[must_use]
    pub const fn resolve(self, native_speech_format: bool) -> CaptureMode {
        match self {
            Self::Buffered => CaptureMode::Buffered,
            Self::Chunked => CaptureMode::Chunked,
            Self::Auto if native_speech_format => CaptureMode::Buffered,
            Self::Auto => CaptureMode::Chunked,
        }
    }
}

/// Produces one audio asset per utterance
pub trait Capturer {
    /// Variant of this capturer
    fn mode(&self) -> CaptureMode;

    /// Acquire the microphone and begin buffering
    ///
    /// Calling `start` while already capturing is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the microphone is unavailable
    fn start(&mut self) -> Result<()>;

    /// Finish buffering and seal the captured audio
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveCapture`] without a prior `start` and
    /// [`Error::EmptyCapture`] if nothing was recorded
    fn stop(&mut self) -> Result<AudioAsset>;

    /// Check if currently capturing
    fn is_capturing(&self) -> bool;
}

/// Build the capturer for `preference` on top of the default microphone
///
/// # Errors
///
/// Returns error if no input device can be opened
pub fn default_capturer(preference: CapturePreference) -> Result<Box<dyn Capturer>> {
    let microphone = Microphone::new()?;
    let mode = preference.resolve(microphone.supports_speech_format());

    tracing::debug!(?preference, ?mode, "capture mode selected");

    Ok(match mode {
        CaptureMode::Buffered => Box::new(BufferedCapturer::new(microphone)),
        CaptureMode::Chunked => Box::new(ChunkedCapturer::new(microphone)),
    })
}

/// Default input device as a [`SampleSource`]
pub struct Microphone {
    device: Device,
    config: StreamConfig,
    native_speech_format: bool,
    stream: Option<Stream>,
}

impl Microphone {
    /// Open the default input device
    ///
    /// Prefers a mono 16kHz configuration and falls back to the device
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if there is no usable input device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::PermissionDenied("no input device available".to_string()))?;

        let speech_config = device
            .supported_input_configs()
            .map_err(|e| match e {
                cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
                    Error::PermissionDenied(e.to_string())
                }
                other => Error::Audio(other.to_string()),
            })?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)).config());

        let native_speech_format = speech_config.is_some();
        let config = match speech_config {
            Some(config) => config,
            None => device
                .default_input_config()
                .map_err(|e| Error::Audio(e.to_string()))?
                .config(),
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            native_speech_format,
            "microphone initialized"
        );

        Ok(Self {
            device,
            config,
            native_speech_format,
            stream: None,
        })
    }

    /// Whether the device records mono 16kHz without conversion
    #[must_use]
    pub const fn supports_speech_format(&self) -> bool {
        self.native_speech_format
    }
}

impl SampleSource for Microphone {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn open(&mut self, mut on_samples: SampleCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels == 1 {
                        on_samples(data);
                    } else {
                        let mono = downmix(data, channels);
                        on_samples(&mono);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    Error::PermissionDenied(e.to_string())
                }
                other => Error::Audio(other.to_string()),
            })?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("microphone stream started");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("microphone stream stopped");
        }
    }
}

/// Average interleaved frames down to one channel
#[allow(clippy::cast_precision_loss)]
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Seal mono samples at `rate` into a 16kHz WAV asset
fn seal(samples: &[f32], rate: u32) -> Result<AudioAsset> {
    let samples = if rate == SAMPLE_RATE {
        samples.to_vec()
    } else {
        resample(samples, rate, SAMPLE_RATE)?
    };

    Ok(AudioAsset::new(samples_to_wav(&samples, SAMPLE_RATE)?, WAV_MIME))
}

/// Keeps the whole utterance in one contiguous buffer
pub struct BufferedCapturer<S> {
    source: S,
    buffer: Arc<Mutex<Vec<f32>>>,
    active: bool,
}

impl<S: SampleSource> BufferedCapturer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Arc::new(Mutex::new(Vec::new())),
            active: false,
        }
    }
}

impl<S: SampleSource> Capturer for BufferedCapturer<S> {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Buffered
    }

    fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }

        lock(&self.buffer).clear();

        let buffer = Arc::clone(&self.buffer);
        self.source.open(Box::new(move |data| {
            lock(&buffer).extend_from_slice(data);
        }))?;
        self.active = true;

        tracing::debug!("buffered capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioAsset> {
        if !self.active {
            return Err(Error::NoActiveCapture);
        }
        self.source.close();
        self.active = false;

        let samples = std::mem::take(&mut *lock(&self.buffer));
        tracing::debug!(samples = samples.len(), "buffered capture stopped");

        if samples.is_empty() {
            return Err(Error::EmptyCapture);
        }
        seal(&samples, self.source.sample_rate())
    }

    fn is_capturing(&self) -> bool {
        self.active
    }
}

/// Chunk accumulator shared with the source callback
#[derive(Default)]
struct Chunks {
    pending: Vec<f32>,
    sealed: Vec<Vec<u8>>,
    chunk_frames: usize,
}

impl Chunks {
    fn push(&mut self, data: &[f32]) {
        self.pending.extend_from_slice(data);
        while self.chunk_frames > 0 && self.pending.len() >= self.chunk_frames {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_frames).collect();
            self.sealed.push(encode_pcm16(&chunk));
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.sealed.push(encode_pcm16(&rest));
        }
    }
}

/// Seals fixed-period chunks and concatenates them on stop
pub struct ChunkedCapturer<S> {
    source: S,
    period: Duration,
    chunks: Arc<Mutex<Chunks>>,
    active: bool,
}

impl<S: SampleSource> ChunkedCapturer<S> {
    /// Create a capturer sealing chunks every [`CHUNK_PERIOD`]
    pub fn new(source: S) -> Self {
        Self::with_period(source, CHUNK_PERIOD)
    }

    pub fn with_period(source: S, period: Duration) -> Self {
        Self {
            source,
            period,
            chunks: Arc::new(Mutex::new(Chunks::default())),
            active: false,
        }
    }

    /// Chunks sealed so far in the current capture
    #[must_use]
    pub fn sealed_chunks(&self) -> usize {
        lock(&self.chunks).sealed.len()
    }
}

impl<S: SampleSource> Capturer for ChunkedCapturer<S> {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Chunked
    }

    fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let chunk_frames =
            (f64::from(self.source.sample_rate()) * self.period.as_secs_f64()).round() as usize;

        *lock(&self.chunks) = Chunks {
            chunk_frames: chunk_frames.max(1),
            ..Chunks::default()
        };

        let chunks = Arc::clone(&self.chunks);
        self.source.open(Box::new(move |data| {
            lock(&chunks).push(data);
        }))?;
        self.active = true;

        tracing::debug!(chunk_frames, "chunked capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioAsset> {
        if !self.active {
            return Err(Error::NoActiveCapture);
        }
        self.source.close();
        self.active = false;

        let sealed = {
            let mut chunks = lock(&self.chunks);
            chunks.flush();
            std::mem::take(&mut chunks.sealed)
        };

        let pcm = sealed.concat();
        tracing::debug!(chunks = sealed.len(), bytes = pcm.len(), "chunked capture stopped");

        if pcm.is_empty() {
            return Err(Error::EmptyCapture);
        }
        seal(&decode_pcm16(&pcm), self.source.sample_rate())
    }

    fn is_capturing(&self) -> bool {
        self.active
    }
}

/// Convert f32 samples to little-endian 16-bit PCM
#[allow(clippy::cast_possible_truncation)]
fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| ((s * 32767.0).clamp(-32768.0, 32767.0) as i16).to_le_bytes())
        .collect()
}

fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}

/// Convert f32 samples to WAV bytes for the STT endpoint
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
