use bytes::{Bytes, BytesMut};

use super::{le_samples, require_16bit, AudioEncoder};
use crate::types::{AudioFormat, PcmSpec, VoiceError};

/// Duration of one Opus frame
const FRAME_DURATION_MS: u32 = 20;

/// Upper bound for one encoded packet
const MAX_PACKET_BYTES: usize = 4000;

/// Streaming Opus encoder emitting one packet per 20 ms frame
///
/// PCM is buffered until a whole frame is available; `flush` pads the last
/// partial frame with silence.
pub struct OpusEncoder {
    encoder: ::opus::Encoder,
    spec: PcmSpec,
    frame_samples: usize,
    buffer: BytesMut,
}

impl OpusEncoder {
    /// Create an encoder; the codec only accepts 8/12/16/24/48 kHz, mono or stereo
    pub fn new(spec: PcmSpec, bitrate_kbps: u32) -> Result<Self, VoiceError> {
        require_16bit(spec)?;
        let channels = match spec.channels() {
            1 => ::opus::Channels::Mono,
            2 => ::opus::Channels::Stereo,
            n => {
                return Err(VoiceError::codec(
                    AudioFormat::Opus,
                    format!("unsupported channel count: {}", n),
                ))
            }
        };

        let mut encoder = ::opus::Encoder::new(spec.sample_rate(), channels, ::opus::Application::Audio)
            .map_err(|e| VoiceError::codec(AudioFormat::Opus, format!("Failed to create Opus encoder: {}", e)))?;
        encoder
            .set_bitrate(::opus::Bitrate::Bits((bitrate_kbps * 1000) as i32))
            .map_err(|e| VoiceError::codec(AudioFormat::Opus, format!("Failed to set bitrate: {}", e)))?;

        let frame_samples = (spec.sample_rate() * FRAME_DURATION_MS / 1000) as usize;
        Ok(Self {
            encoder,
            spec,
            frame_samples,
            buffer: BytesMut::new(),
        })
    }

    /// Samples per channel in one frame
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// PCM bytes in one frame
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * self.spec.frame_bytes()
    }

    /// Buffer `pcm` and return one packet per completed frame
    pub fn encode_frames(&mut self, pcm: &[u8]) -> Result<Vec<Bytes>, VoiceError> {
        self.buffer.extend_from_slice(pcm);
        let frame_bytes = self.frame_bytes();
        let mut packets = Vec::with_capacity(self.buffer.len() / frame_bytes);
        while self.buffer.len() >= frame_bytes {
            let frame = self.buffer.split_to(frame_bytes);
            packets.push(self.encode_frame(&frame)?);
        }
        Ok(packets)
    }

    /// Pad and encode the buffered remainder, if any
    pub fn flush_frame(&mut self) -> Result<Option<Bytes>, VoiceError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let frame_bytes = self.frame_bytes();
        let mut frame = self.buffer.split();
        frame.resize(frame_bytes, 0);
        self.encode_frame(&frame).map(Some)
    }

    fn encode_frame(&mut self, frame: &[u8]) -> Result<Bytes, VoiceError> {
        let samples = le_samples(frame);
        let packet = self
            .encoder
            .encode_vec(&samples, MAX_PACKET_BYTES)
            .map_err(|e| VoiceError::codec(AudioFormat::Opus, format!("Opus encode error: {}", e)))?;
        Ok(Bytes::from(packet))
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<Bytes, VoiceError> {
        if pcm.is_empty() {
            return Ok(Bytes::new());
        }
        let packets = self.encode_frames(pcm)?;
        Ok(match packets.len() {
            0 => Bytes::new(),
            1 => packets.into_iter().next().unwrap_or_default(),
            _ => packets.concat().into(),
        })
    }

    fn flush(&mut self) -> Result<Option<Bytes>, VoiceError> {
        self.flush_frame()
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Opus
    }

    fn pcm_spec(&self) -> PcmSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> OpusEncoder {
        OpusEncoder::new(PcmSpec::default(), 64).unwrap()
    }

    fn decoded_samples(packet: &[u8]) -> usize {
        let mut decoder = ::opus::Decoder::new(16_000, ::opus::Channels::Mono).unwrap();
        let mut out = vec![0i16; 5760];
        decoder.decode(packet, &mut out, false).unwrap()
    }

    #[test]
    fn test_frame_geometry() {
        let encoder = encoder();
        assert_eq!(encoder.frame_samples(), 320);
        assert_eq!(encoder.frame_bytes(), 640);

        let stereo = OpusEncoder::new(PcmSpec::new(48_000, 2, 2).unwrap(), 64).unwrap();
        assert_eq!(stereo.frame_bytes(), 960 * 4);
    }

    #[test]
    fn test_exact_frame_yields_one_packet() {
        let mut encoder = encoder();
        let packets = encoder.encode_frames(&[0u8; 640]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(decoded_samples(&packets[0]), 320);
        assert!(encoder.flush().unwrap().is_none());
    }

    #[test]
    fn test_partial_frame_is_padded_on_flush() {
        let mut encoder = encoder();
        let packets = encoder.encode_frames(&[1u8; 960]).unwrap();
        assert_eq!(packets.len(), 1);

        let tail = encoder.flush().unwrap().expect("padded final frame");
        assert_eq!(decoded_samples(&tail), 320);
        assert!(encoder.flush().unwrap().is_none());
    }

    #[test]
    fn test_empty_input_flushes_nothing() {
        let mut encoder = encoder();
        assert!(encoder.encode_chunk(&[]).unwrap().is_empty());
        assert!(encoder.flush().unwrap().is_none());
    }

    #[test]
    fn test_split_chunks_match_whole_input() {
        let pcm: Vec<u8> = (0..1280u32).map(|i| (i % 251) as u8).collect();

        let mut whole = encoder();
        let expected = whole.encode_chunk(&pcm).unwrap();

        let mut split = encoder();
        let mut actual = Vec::new();
        for piece in pcm.chunks(100) {
            actual.extend_from_slice(&split.encode_chunk(piece).unwrap());
        }
        assert_eq!(actual, expected.to_vec());
    }

    #[test]
    fn test_rejects_unsupported_rate() {
        let spec = PcmSpec::new(44_100, 1, 2).unwrap();
        assert!(matches!(
            OpusEncoder::new(spec, 64),
            Err(VoiceError::Codec {
                format: AudioFormat::Opus,
                ..
            })
        ));
    }
}
