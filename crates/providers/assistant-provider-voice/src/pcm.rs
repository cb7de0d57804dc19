//! Raw sample normalization
//!
//! Speech engines hand back samples in whatever representation they like:
//! already-packed bytes, `i16` vectors, float buffers, or a samples/metadata
//! pair. [`PcmNormalizer`] turns each of those into canonical PCM (signed
//! 16-bit, little-endian, channel-interleaved) so nothing downstream has to
//! care.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{PcmSpec, VoiceError, CANONICAL_SAMPLE_WIDTH};

/// Byte order of an integer sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder {
    /// Byte order of the running platform
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }
}

/// Metadata an engine may attach to a chunk of samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleMetadata {
    /// Sample rate reported by the engine, if any
    pub sample_rate: Option<u32>,
}

/// One chunk of engine output in its native representation
#[derive(Debug, Clone, PartialEq)]
pub enum RawSamples {
    /// Already canonical s16le bytes
    Bytes(Bytes),
    /// Native 16-bit integers
    I16(Vec<i16>),
    /// Packed integer buffer with explicit element width and byte order
    IntBuffer {
        /// Packed sample bytes
        data: Bytes,
        /// Bytes per element
        width: usize,
        /// Byte order of each element
        order: ByteOrder,
    },
    /// Single-precision float samples in [-1.0, 1.0]
    F32(Vec<f32>),
    /// Double-precision float samples in [-1.0, 1.0]
    F64(Vec<f64>),
    /// Samples paired with engine metadata
    Tagged(Box<RawSamples>, SampleMetadata),
}

impl RawSamples {
    /// Wrap samples with metadata
    pub fn tagged(samples: RawSamples, metadata: SampleMetadata) -> Self {
        Self::Tagged(Box::new(samples), metadata)
    }

    /// Short name of the representation, for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::I16(_) => "i16",
            Self::IntBuffer { .. } => "int-buffer",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Tagged(..) => "tagged",
        }
    }
}

impl From<Bytes> for RawSamples {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for RawSamples {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<Vec<i16>> for RawSamples {
    fn from(samples: Vec<i16>) -> Self {
        Self::I16(samples)
    }
}

impl From<Vec<f32>> for RawSamples {
    fn from(samples: Vec<f32>) -> Self {
        Self::F32(samples)
    }
}

impl From<Vec<f64>> for RawSamples {
    fn from(samples: Vec<f64>) -> Self {
        Self::F64(samples)
    }
}

/// Converts [`RawSamples`] into canonical PCM for one stream's [`PcmSpec`]
#[derive(Debug, Clone, Copy)]
pub struct PcmNormalizer {
    spec: PcmSpec,
}

impl PcmNormalizer {
    /// Create a normalizer producing PCM for `spec`
    pub fn new(spec: PcmSpec) -> Result<Self, VoiceError> {
        if spec.sample_width_bytes() != CANONICAL_SAMPLE_WIDTH {
            return Err(VoiceError::UnsupportedSampleWidth(spec.sample_width_bytes()));
        }
        Ok(Self { spec })
    }

    /// Target layout
    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    /// Convert one raw chunk to canonical bytes
    ///
    /// Fails on shapes that cannot be represented as 16-bit PCM and on output
    /// that is not a whole number of sample frames.
    pub fn normalize(&self, raw: RawSamples) -> Result<Bytes, VoiceError> {
        let pcm = to_canonical(raw)?;
        if !self.spec.is_aligned(pcm.len()) {
            return Err(VoiceError::Normalization(format!(
                "{} bytes is not a whole number of {}-byte frames",
                pcm.len(),
                self.spec.frame_bytes()
            )));
        }
        Ok(pcm)
    }
}

fn to_canonical(raw: RawSamples) -> Result<Bytes, VoiceError> {
    match raw {
        RawSamples::Bytes(data) => Ok(data),
        RawSamples::Tagged(inner, _) => to_canonical(*inner),
        RawSamples::I16(samples) => {
            let mut out = BytesMut::with_capacity(samples.len() * CANONICAL_SAMPLE_WIDTH);
            for sample in samples {
                out.put_i16_le(sample);
            }
            Ok(out.freeze())
        }
        RawSamples::IntBuffer { data, width, order } => int_buffer_to_canonical(data, width, order),
        RawSamples::F32(samples) => Ok(floats_to_canonical(samples.into_iter().map(f64::from))),
        RawSamples::F64(samples) => Ok(floats_to_canonical(samples.into_iter())),
    }
}

fn int_buffer_to_canonical(data: Bytes, width: usize, order: ByteOrder) -> Result<Bytes, VoiceError> {
    if width != CANONICAL_SAMPLE_WIDTH {
        return Err(VoiceError::Normalization(format!(
            "unsupported integer sample width: {} bytes",
            width
        )));
    }
    if data.len() % width != 0 {
        return Err(VoiceError::Normalization(format!(
            "integer buffer of {} bytes is not a whole number of {}-byte samples",
            data.len(),
            width
        )));
    }
    match order {
        ByteOrder::Little => Ok(data),
        ByteOrder::Big => {
            let mut out = BytesMut::with_capacity(data.len());
            for pair in data.chunks_exact(CANONICAL_SAMPLE_WIDTH) {
                out.put_slice(&[pair[1], pair[0]]);
            }
            Ok(out.freeze())
        }
    }
}

fn floats_to_canonical(samples: impl ExactSizeIterator<Item = f64>) -> Bytes {
    let mut out = BytesMut::with_capacity(samples.len() * CANONICAL_SAMPLE_WIDTH);
    for sample in samples {
        out.put_i16_le(float_to_i16(sample));
    }
    out.freeze()
}

/// Scale an amplitude in [-1.0, 1.0] to a 16-bit sample, saturating
pub fn float_to_i16(sample: f64) -> i16 {
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PcmNormalizer {
        PcmNormalizer::new(PcmSpec::default()).unwrap()
    }

    fn canonical(samples: &[i16]) -> Bytes {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>().into()
    }

    #[test]
    fn test_bytes_pass_through_unchanged() {
        let input = canonical(&[0, 1000, -1000]);
        let once = normalizer().normalize(RawSamples::Bytes(input.clone())).unwrap();
        assert_eq!(once, input);
        let twice = normalizer().normalize(RawSamples::Bytes(once.clone())).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_integer_shapes_agree() {
        let logical = [0i16, 1000, -1000, 32767, -32768, 258];
        let expected = canonical(&logical);

        let native = RawSamples::I16(logical.to_vec());
        let little = RawSamples::IntBuffer {
            data: expected.clone(),
            width: 2,
            order: ByteOrder::Little,
        };
        let big = RawSamples::IntBuffer {
            data: logical.iter().flat_map(|s| s.to_be_bytes()).collect::<Vec<u8>>().into(),
            width: 2,
            order: ByteOrder::Big,
        };
        let wrapped = RawSamples::tagged(
            RawSamples::I16(logical.to_vec()),
            SampleMetadata {
                sample_rate: Some(16_000),
            },
        );

        for raw in [native, little, big, wrapped] {
            let kind = raw.kind();
            assert_eq!(normalizer().normalize(raw).unwrap(), expected, "shape {}", kind);
        }
    }

    #[test]
    fn test_float_shapes_agree() {
        let expected = canonical(&[0, 32767, -32767, 16384]);

        let f32s = RawSamples::F32(vec![0.0, 1.0, -1.0, 0.5]);
        let f64s = RawSamples::F64(vec![0.0, 1.0, -1.0, 0.5]);
        let ints = RawSamples::I16(vec![0, 32767, -32767, 16384]);
        let wrapped = RawSamples::tagged(RawSamples::F32(vec![0.0, 1.0, -1.0, 0.5]), SampleMetadata::default());

        for raw in [f32s, f64s, ints, wrapped] {
            assert_eq!(normalizer().normalize(raw).unwrap(), expected);
        }
    }

    #[test]
    fn test_float_clamping() {
        assert_eq!(float_to_i16(2.0), 32767);
        assert_eq!(float_to_i16(-2.0), -32768);
        assert_eq!(float_to_i16(0.0), 0);
        assert_eq!(float_to_i16(f64::NAN), 0);
    }

    #[test]
    fn test_unsupported_width_is_error() {
        let raw = RawSamples::IntBuffer {
            data: Bytes::from_static(&[0, 0, 0, 0]),
            width: 4,
            order: ByteOrder::Little,
        };
        let err = normalizer().normalize(raw).unwrap_err();
        assert!(matches!(err, VoiceError::Normalization(_)));
    }

    #[test]
    fn test_partial_samples_are_errors() {
        let raw = RawSamples::IntBuffer {
            data: Bytes::from_static(&[1, 2, 3]),
            width: 2,
            order: ByteOrder::Big,
        };
        assert!(normalizer().normalize(raw).is_err());

        let stereo = PcmNormalizer::new(PcmSpec::new(16_000, 2, 2).unwrap()).unwrap();
        let err = stereo.normalize(RawSamples::I16(vec![1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("4-byte frames"));
    }

    #[test]
    fn test_rejects_non_16bit_spec() {
        let spec = PcmSpec::new(16_000, 1, 3).unwrap();
        assert!(matches!(
            PcmNormalizer::new(spec),
            Err(VoiceError::UnsupportedSampleWidth(3))
        ));
    }

    #[test]
    fn test_native_order_matches_platform() {
        let expected = if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        };
        assert_eq!(ByteOrder::native(), expected);
    }
}
