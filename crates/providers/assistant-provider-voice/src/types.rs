//! Core types for the voice provider

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sample width of canonical PCM (signed 16-bit)
pub const CANONICAL_SAMPLE_WIDTH: usize = 2;

/// Default sample rate used when an engine does not declare one
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Raw audio layout: sample rate, channel count and bytes per sample
///
/// Immutable once built; every component touching a stream shares one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PcmSpec {
    sample_rate: u32,
    channels: u16,
    sample_width_bytes: usize,
}

impl PcmSpec {
    /// Create a spec, rejecting zero-valued fields
    pub fn new(sample_rate: u32, channels: u16, sample_width_bytes: usize) -> Result<Self, VoiceError> {
        if sample_rate == 0 || channels == 0 || sample_width_bytes == 0 {
            return Err(VoiceError::InvalidPcmSpec(format!(
                "sample_rate={}, channels={}, sample_width_bytes={}",
                sample_rate, channels, sample_width_bytes
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            sample_width_bytes,
        })
    }

    /// Mono 16-bit PCM at the given rate
    pub fn mono_16bit(sample_rate: u32) -> Result<Self, VoiceError> {
        Self::new(sample_rate, 1, CANONICAL_SAMPLE_WIDTH)
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes per single-channel sample
    pub fn sample_width_bytes(&self) -> usize {
        self.sample_width_bytes
    }

    /// Bytes in one multi-channel sample frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.sample_width_bytes
    }

    /// Whether `len` bytes hold a whole number of sample frames
    pub fn is_aligned(&self, len: usize) -> bool {
        len % self.frame_bytes() == 0
    }

    /// Playback duration of `len` bytes of PCM in this layout
    pub fn duration_of(&self, len: usize) -> Duration {
        let frames = (len / self.frame_bytes()) as u64;
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }
}

impl Default for PcmSpec {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            sample_width_bytes: CANONICAL_SAMPLE_WIDTH,
        }
    }
}

/// Audio output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// PCM raw audio (s16le)
    Pcm,
    /// MP3 (most compatible)
    Mp3,
    /// Opus packets, 20 ms frames
    Opus,
}

impl AudioFormat {
    /// Get format as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
        }
    }

    /// Get MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pcm => "audio/pcm",
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/ogg; codecs=opus",
        }
    }

    /// Get file extension
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// `Content-Disposition` value naming the download after the format
    pub fn content_disposition(&self) -> String {
        format!("inline; filename=\"speech.{}\"", self.extension())
    }

    /// Parse an optional request field, defaulting to MP3
    pub fn from_request(value: Option<&str>) -> Result<Self, VoiceError> {
        match value {
            None => Ok(Self::default()),
            Some(raw) => raw.parse(),
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Mp3
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pcm" => Ok(Self::Pcm),
            "mp3" => Ok(Self::Mp3),
            "opus" => Ok(Self::Opus),
            _ => Err(VoiceError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Speech synthesis payload as received from clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// Text to speak
    pub text: String,
    /// Voice identifier; the worker's default when absent
    #[serde(default)]
    pub voice: Option<String>,
    /// Output format ("pcm", "mp3", "opus"); MP3 when absent
    #[serde(default)]
    pub format: Option<String>,
}

impl SpeechRequest {
    /// Create a request for `text` with defaults for voice and format
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            format: None,
        }
    }

    /// Set the voice
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the output format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Why a voice model could not be made available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelUnavailableReason {
    /// The speech engine itself is not installed
    EngineMissing,
    /// The model file for the voice does not exist
    ModelFileMissing,
    /// Required configuration (models path, default voice) is absent
    ConfigurationMissing,
}

impl fmt::Display for ModelUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EngineMissing => "engine not installed",
            Self::ModelFileMissing => "model file missing",
            Self::ConfigurationMissing => "configuration missing",
        })
    }
}

/// Voice synthesis and audio pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Unsupported output format requested
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Request text empty or whitespace only
    #[error("Text must not be empty")]
    EmptyText,

    /// Voice identifier is malformed
    #[error("Invalid voice: {0}")]
    InvalidVoice(String),

    /// Raw samples could not be converted to canonical PCM
    #[error("PCM normalization failed: {0}")]
    Normalization(String),

    /// Voice model cannot be loaded
    #[error("Voice model unavailable for '{voice_id}' ({reason}): {message}")]
    ModelUnavailable {
        /// Requested voice
        voice_id: String,
        /// Failure category
        reason: ModelUnavailableReason,
        /// Underlying cause
        message: String,
    },

    /// Encoders only accept 16-bit PCM
    #[error("Unsupported PCM sample width: {0} bytes (only 2-byte samples are supported)")]
    UnsupportedSampleWidth(usize),

    /// Codec construction or encoding failed
    #[error("{format} codec error: {message}")]
    Codec {
        /// Output format of the failing codec
        format: AudioFormat,
        /// Underlying cause
        message: String,
    },

    /// Engine failed while synthesizing
    #[error("Synthesis failed for voice '{voice_id}': {message}")]
    Synthesis {
        /// Voice in use
        voice_id: String,
        /// Underlying cause
        message: String,
    },

    /// Push attempted after the stream was closed
    #[error("Audio stream is closed")]
    StreamClosed,

    /// PCM chunk not a whole number of sample frames
    #[error("PCM chunk of {len} bytes is not aligned to {frame_bytes}-byte frames")]
    MisalignedChunk {
        /// Chunk length
        len: usize,
        /// Frame size of the stream's PcmSpec
        frame_bytes: usize,
    },

    /// PcmSpec with zero-valued fields
    #[error("Invalid PCM spec: {0}")]
    InvalidPcmSpec(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Whether the failure is the caller's fault (bad request)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_) | Self::EmptyText | Self::InvalidVoice(_)
        )
    }

    /// Whether the failure is a missing engine/model rather than a broken one
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }

    /// Shorthand for a codec failure
    pub fn codec(format: AudioFormat, message: impl fmt::Display) -> Self {
        Self::Codec {
            format,
            message: message.to_string(),
        }
    }
}

impl From<VoiceError> for assistant_core::AssistantError {
    fn from(err: VoiceError) -> Self {
        if err.is_client_error() {
            assistant_core::AssistantError::validation(err.to_string())
        } else {
            assistant_core::AssistantError::service(err.to_string())
        }
    }
}
