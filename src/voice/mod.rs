//! Voice I/O
//!
//! Microphone capture into sealed assets, the base64 transport codec, and
//! speaker playback with a speaking flag. Speech recognition and synthesis
//! happen on the backend (see [`crate::backend`]).

pub mod capture;
pub mod codec;
pub mod playback;
mod resample;

pub use capture::{
    BufferedCapturer, CaptureMode, CapturePreference, Capturer, ChunkedCapturer, Microphone,
    SAMPLE_RATE, SampleCallback, SampleSource, default_capturer, samples_to_wav,
};
pub use codec::{AudioAsset, AudioCodec, Base64Codec, PlayableAsset, TTS_MIME, WAV_MIME};
pub use playback::{
    AudioSink, DecodedClip, Playback, PlaybackHandle, SpeakerOutput, decode_clip,
};
pub use resample::resample;
