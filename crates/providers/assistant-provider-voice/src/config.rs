//! Service settings loaded from the YAML config file

use assistant_core::{load_yaml_config, LoggingSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::encoders::{EncoderSettings, DEFAULT_MP3_BITRATE_KBPS, DEFAULT_OPUS_BITRATE_KBPS};
use crate::types::{PcmSpec, VoiceError, DEFAULT_SAMPLE_RATE};

/// Default bytes per chunk when splitting bulk engine output
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Speech engine selected at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    /// Deterministic synthetic audio, no dependencies
    #[default]
    Synthetic,
    /// Piper neural TTS binary
    Piper,
}

impl TtsEngine {
    /// Lowercase config name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Piper => "piper",
        }
    }
}

impl fmt::Display for TtsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `tts` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    /// Engine to serve requests with
    pub engine: TtsEngine,
    /// Directory holding `<voice>.onnx` models
    pub models_path: Option<PathBuf>,
    /// Voice used when a request names none
    pub default_model: Option<String>,
    /// Piper executable (looked up on PATH when not absolute)
    pub piper_binary: PathBuf,
    /// Bytes per chunk for bulk engine output
    pub chunk_size: usize,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            engine: TtsEngine::default(),
            models_path: None,
            default_model: None,
            piper_binary: PathBuf::from("piper"),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// `audio` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Sample rate of the synthetic worker and the fallback for models
    pub sample_rate: u32,
    /// MP3 bitrate
    pub mp3_bitrate_kbps: u32,
    /// Opus bitrate
    pub opus_bitrate_kbps: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            mp3_bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
            opus_bitrate_kbps: DEFAULT_OPUS_BITRATE_KBPS,
        }
    }
}

impl AudioSettings {
    /// Mono 16-bit layout at the configured rate
    pub fn pcm_spec(&self) -> Result<PcmSpec, VoiceError> {
        PcmSpec::mono_16bit(self.sample_rate)
    }

    /// Codec parameters for response encoders
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            mp3_bitrate_kbps: self.mp3_bitrate_kbps,
            opus_bitrate_kbps: self.opus_bitrate_kbps,
        }
    }
}

/// `server` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Log output
    pub logging: LoggingSettings,
    /// HTTP listener
    pub server: ServerSettings,
    /// Speech engine
    pub tts: TtsSettings,
    /// Output audio
    pub audio: AudioSettings,
}

impl AppSettings {
    /// Load from `path`; a missing or empty file yields defaults
    pub fn load(path: impl AsRef<Path>) -> assistant_core::Result<Self> {
        let settings: Self = load_yaml_config(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would only fail later at request time
    pub fn validate(&self) -> assistant_core::Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(assistant_core::AssistantError::config("audio.sample_rate must be positive"));
        }
        if self.tts.chunk_size == 0 {
            return Err(assistant_core::AssistantError::config("tts.chunk_size must be positive"));
        }
        Ok(())
    }
}
