//! Streaming audio encoders
//!
//! Each encoder consumes canonical PCM in chunks of any size and emits encoded
//! bytes as soon as the codec produces them. `flush` is called exactly once
//! after the last chunk to drain whatever the codec still holds.

mod mp3;
mod opus;
mod pcm;

pub use self::mp3::Mp3Encoder;
pub use self::opus::OpusEncoder;
pub use self::pcm::PcmPassthroughEncoder;

use bytes::Bytes;

use crate::types::{AudioFormat, PcmSpec, VoiceError, CANONICAL_SAMPLE_WIDTH};

/// Default MP3 bitrate in kbps
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 128;

/// Default Opus bitrate in kbps
pub const DEFAULT_OPUS_BITRATE_KBPS: u32 = 64;

/// Incremental PCM-to-codec transformation
pub trait AudioEncoder: Send {
    /// Encode one PCM chunk; may return empty bytes while the codec buffers
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Bytes, VoiceError>;

    /// Emit trailing data held by the codec, if any
    fn flush(&mut self) -> Result<Option<Bytes>, VoiceError>;

    /// Format of the emitted bytes
    fn output_format(&self) -> AudioFormat;

    /// Layout of the accepted PCM
    fn pcm_spec(&self) -> PcmSpec;
}

/// Codec parameters not carried by [`PcmSpec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// MP3 bitrate in kbps
    pub mp3_bitrate_kbps: u32,
    /// Opus bitrate in kbps
    pub opus_bitrate_kbps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            mp3_bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
            opus_bitrate_kbps: DEFAULT_OPUS_BITRATE_KBPS,
        }
    }
}

/// Encoder selected once per response from the requested format
pub enum Encoder {
    /// Raw PCM passthrough
    Pcm(PcmPassthroughEncoder),
    /// LAME MP3
    Mp3(Mp3Encoder),
    /// 20 ms Opus frames
    Opus(OpusEncoder),
}

impl Encoder {
    /// Build the encoder for `format`
    ///
    /// All construction failures (unsupported sample width, codec rejecting the
    /// layout) surface here, before any byte is produced.
    pub fn for_format(format: AudioFormat, spec: PcmSpec, settings: &EncoderSettings) -> Result<Self, VoiceError> {
        let encoder = match format {
            AudioFormat::Pcm => Self::Pcm(PcmPassthroughEncoder::new(spec)?),
            AudioFormat::Mp3 => Self::Mp3(Mp3Encoder::new(spec, settings.mp3_bitrate_kbps)?),
            AudioFormat::Opus => Self::Opus(OpusEncoder::new(spec, settings.opus_bitrate_kbps)?),
        };
        tracing::debug!(
            format = %format,
            sample_rate = spec.sample_rate(),
            channels = spec.channels(),
            "Audio encoder created"
        );
        Ok(encoder)
    }

    fn inner(&mut self) -> &mut dyn AudioEncoder {
        match self {
            Self::Pcm(e) => e,
            Self::Mp3(e) => e,
            Self::Opus(e) => e,
        }
    }

    fn inner_ref(&self) -> &dyn AudioEncoder {
        match self {
            Self::Pcm(e) => e,
            Self::Mp3(e) => e,
            Self::Opus(e) => e,
        }
    }
}

impl AudioEncoder for Encoder {
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Bytes, VoiceError> {
        self.inner().encode_chunk(pcm)
    }

    fn flush(&mut self) -> Result<Option<Bytes>, VoiceError> {
        self.inner().flush()
    }

    fn output_format(&self) -> AudioFormat {
        self.inner_ref().output_format()
    }

    fn pcm_spec(&self) -> PcmSpec {
        self.inner_ref().pcm_spec()
    }
}

pub(crate) fn require_16bit(spec: PcmSpec) -> Result<(), VoiceError> {
    if spec.sample_width_bytes() != CANONICAL_SAMPLE_WIDTH {
        return Err(VoiceError::UnsupportedSampleWidth(spec.sample_width_bytes()));
    }
    Ok(())
}

/// Reinterpret canonical PCM bytes as samples
pub(crate) fn le_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(CANONICAL_SAMPLE_WIDTH)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
