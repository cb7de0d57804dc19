use bytes::Bytes;

use super::{require_16bit, AudioEncoder};
use crate::types::{AudioFormat, PcmSpec, VoiceError};

/// Returns PCM unchanged
#[derive(Debug, Clone)]
pub struct PcmPassthroughEncoder {
    spec: PcmSpec,
}

impl PcmPassthroughEncoder {
    /// Create a passthrough for 16-bit PCM
    pub fn new(spec: PcmSpec) -> Result<Self, VoiceError> {
        require_16bit(spec)?;
        Ok(Self { spec })
    }
}

impl AudioEncoder for PcmPassthroughEncoder {
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Bytes, VoiceError> {
        Ok(Bytes::copy_from_slice(pcm))
    }

    fn flush(&mut self) -> Result<Option<Bytes>, VoiceError> {
        Ok(None)
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Pcm
    }

    fn pcm_spec(&self) -> PcmSpec {
        self.spec
    }
}
