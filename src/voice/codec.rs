//! Audio assets and their base64 transport encoding
//!
//! Audio crosses the HTTP boundary as standard base64 text: captured assets
//! are encoded before STT, and TTS replies are decoded into playable bytes.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// MIME type of captured speech
pub const WAV_MIME: &str = "audio/wav";

/// MIME type assumed for synthesized speech
pub const TTS_MIME: &str = "audio/wav";

/// Sealed captured audio, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    bytes: Vec<u8>,
    mime: String,
}

impl AudioAsset {
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// Load an asset from disk, inferring the MIME type from the extension
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetRead`] if the file cannot be read
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::AssetRead {
            path: path.to_path_buf(),
            source,
        })?;

        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("mp3") => "audio/mpeg",
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => WAV_MIME,
        };

        Ok(Self::new(bytes, mime))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded synthesized audio ready for an output sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableAsset {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Converts between raw audio bytes and the transport text form
pub trait AudioCodec: Send + Sync {
    /// Encode raw bytes as transport text
    fn encode(&self, bytes: &[u8]) -> String;

    /// Decode transport text into raw bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if `payload` is not valid
    fn decode(&self, payload: &str) -> Result<Vec<u8>>;

    /// Encode a captured asset for the STT request
    fn to_base64(&self, asset: &AudioAsset) -> String {
        self.encode(asset.bytes())
    }

    /// Decode a TTS payload into a playable asset
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if `payload` is not valid
    fn from_base64(&self, payload: &str, mime: &str) -> Result<PlayableAsset> {
        Ok(PlayableAsset {
            bytes: self.decode(payload)?,
            mime: mime.to_string(),
        })
    }
}

/// Standard-alphabet, padded base64 (RFC 4648)
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl AudioCodec for Base64Codec {
    fn encode(&self, bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn decode(&self, payload: &str) -> Result<Vec<u8>> {
        let payload = payload.trim();
        // Tolerate data URLs such as `data:audio/wav;base64,...`
        let payload = match payload.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => payload,
        };

        STANDARD
            .decode(payload)
            .map_err(|e| Error::MalformedPayload(format!("invalid base64 audio: {e}")))
    }
}
