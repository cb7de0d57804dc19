use bytes::Bytes;
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};

use super::{le_samples, require_16bit, AudioEncoder};
use crate::types::{AudioFormat, PcmSpec, VoiceError};

/// Worst-case size of the data LAME emits on flush
const FLUSH_RESERVE_BYTES: usize = 7200;

/// Streaming MP3 encoder backed by LAME
///
/// Chunks may split a sample frame; the partial frame is held back until the
/// next call.
pub struct Mp3Encoder {
    encoder: mp3lame_encoder::Encoder,
    spec: PcmSpec,
    pending: Vec<u8>,
}

impl Mp3Encoder {
    /// Create an encoder for mono or stereo 16-bit PCM
    pub fn new(spec: PcmSpec, bitrate_kbps: u32) -> Result<Self, VoiceError> {
        require_16bit(spec)?;
        let channels = match spec.channels() {
            1 => 1u8,
            2 => 2u8,
            n => {
                return Err(VoiceError::codec(
                    AudioFormat::Mp3,
                    format!("unsupported channel count: {}", n),
                ))
            }
        };

        let mut builder = Builder::new()
            .ok_or_else(|| VoiceError::codec(AudioFormat::Mp3, "failed to allocate LAME encoder"))?;
        builder
            .set_num_channels(channels)
            .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("channels: {:?}", e)))?;
        builder
            .set_sample_rate(spec.sample_rate())
            .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("sample rate: {:?}", e)))?;
        builder
            .set_brate(bitrate(bitrate_kbps))
            .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("bitrate: {:?}", e)))?;
        builder
            .set_quality(Quality::NearBest)
            .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("quality: {:?}", e)))?;
        let encoder = builder
            .build()
            .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("init: {:?}", e)))?;

        Ok(Self {
            encoder,
            spec,
            pending: Vec::new(),
        })
    }
}

/// Closest LAME bitrate at or below `kbps`
fn bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=15 => Bitrate::Kbps8,
        16..=23 => Bitrate::Kbps16,
        24..=31 => Bitrate::Kbps24,
        32..=39 => Bitrate::Kbps32,
        40..=47 => Bitrate::Kbps40,
        48..=63 => Bitrate::Kbps48,
        64..=79 => Bitrate::Kbps64,
        80..=95 => Bitrate::Kbps80,
        96..=111 => Bitrate::Kbps96,
        112..=127 => Bitrate::Kbps112,
        128..=159 => Bitrate::Kbps128,
        160..=191 => Bitrate::Kbps160,
        192..=223 => Bitrate::Kbps192,
        224..=255 => Bitrate::Kbps224,
        256..=319 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

impl AudioEncoder for Mp3Encoder {
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Bytes, VoiceError> {
        if pcm.is_empty() {
            return Ok(Bytes::new());
        }
        self.pending.extend_from_slice(pcm);
        let frame_bytes = self.spec.frame_bytes();
        let usable = self.pending.len() - self.pending.len() % frame_bytes;
        if usable == 0 {
            return Ok(Bytes::new());
        }

        let samples = le_samples(&self.pending[..usable]);
        self.pending.drain(..usable);

        let frames = samples.len() / self.spec.channels() as usize;
        let mut out = Vec::new();
        out.reserve(mp3lame_encoder::max_required_buffer_size(frames));
        let written = if self.spec.channels() == 1 {
            self.encoder.encode_to_vec(MonoPcm(&samples), &mut out)
        } else {
            self.encoder.encode_to_vec(InterleavedPcm(&samples), &mut out)
        }
        .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("encode: {:?}", e)))?;

        tracing::trace!(pcm_frames = frames, mp3_bytes = written, "MP3 chunk encoded");
        Ok(Bytes::from(out))
    }

    fn flush(&mut self) -> Result<Option<Bytes>, VoiceError> {
        if !self.pending.is_empty() {
            tracing::warn!(
                bytes = self.pending.len(),
                "Dropping partial PCM frame at end of MP3 stream"
            );
            self.pending.clear();
        }
        let mut out = Vec::with_capacity(FLUSH_RESERVE_BYTES);
        self.encoder
            .flush_to_vec::<FlushNoGap>(&mut out)
            .map_err(|e| VoiceError::codec(AudioFormat::Mp3, format!("flush: {:?}", e)))?;
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::from(out)))
        }
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn pcm_spec(&self) -> PcmSpec {
        self.spec
    }
}
