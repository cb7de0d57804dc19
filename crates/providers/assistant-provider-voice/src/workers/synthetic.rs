use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use super::{SpeechWorker, Synthesis, SYNTHETIC_WORKER_TYPE};
use crate::stream::AudioStream;
use crate::types::{PcmSpec, SpeechRequest, VoiceError, CANONICAL_SAMPLE_WIDTH};

/// Samples generated for each input character
pub const SAMPLES_PER_CHAR: usize = 160;

/// Deterministic stand-in for a speech engine
///
/// Each character becomes one 160-sample sawtooth chunk seeded by its code
/// point, so identical text always yields identical PCM.
#[derive(Debug, Clone)]
pub struct SyntheticWorker {
    spec: PcmSpec,
}

impl SyntheticWorker {
    /// Worker emitting mono 16-bit PCM at `spec`'s sample rate
    pub fn new(spec: PcmSpec) -> Self {
        Self { spec }
    }

    fn chunk_for_char(c: char) -> Bytes {
        let seed = c as usize;
        let mut buf = BytesMut::with_capacity(SAMPLES_PER_CHAR * CANONICAL_SAMPLE_WIDTH);
        for i in 0..SAMPLES_PER_CHAR {
            let value = ((i + seed) % 256) as i16 - 128;
            buf.put_i16_le(value * 256);
        }
        buf.freeze()
    }

    fn silence() -> Bytes {
        Bytes::from(vec![0u8; SAMPLES_PER_CHAR * CANONICAL_SAMPLE_WIDTH])
    }
}

#[async_trait]
impl SpeechWorker for SyntheticWorker {
    fn worker_type(&self) -> &'static str {
        SYNTHETIC_WORKER_TYPE
    }

    async fn process(&self, request: &SpeechRequest) -> Result<Synthesis, VoiceError> {
        let stream = AudioStream::buffered(self.spec);
        if request.text.is_empty() {
            stream.push_pcm(Self::silence())?;
        } else {
            for c in request.text.chars() {
                stream.push_pcm(Self::chunk_for_char(c))?;
            }
        }
        stream.close();

        debug!(
            chars = request.text.chars().count(),
            bytes = stream.pushed_bytes(),
            "Synthetic speech generated"
        );
        Ok(Synthesis {
            stream,
            pcm_spec: self.spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamRead;

    fn drain(stream: &AudioStream) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while let StreamRead::Chunk(chunk) = stream.read_encoded().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_one_chunk_per_char() {
        let worker = SyntheticWorker::new(PcmSpec::default());
        let synthesis = worker.process(&SpeechRequest::new("hi")).await.unwrap();

        assert!(synthesis.stream.is_closed());
        assert_eq!(synthesis.pcm_spec, PcmSpec::default());
        let chunks = drain(&synthesis.stream);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 320));
    }

    #[tokio::test]
    async fn test_sample_formula() {
        let worker = SyntheticWorker::new(PcmSpec::default());
        let synthesis = worker.process(&SpeechRequest::new("A")).await.unwrap();
        let chunk = drain(&synthesis.stream).remove(0);

        // 'A' = 65: sample 0 is (65 - 128) * 256
        assert_eq!(i16::from_le_bytes([chunk[0], chunk[1]]), -63 * 256);
        // sample 100: (100 + 65) - 128 = 37
        assert_eq!(i16::from_le_bytes([chunk[200], chunk[201]]), 37 * 256);
        // last sample: (159 + 65) - 128 = 96
        assert_eq!(i16::from_le_bytes([chunk[318], chunk[319]]), 96 * 256);
    }

    #[tokio::test]
    async fn test_empty_text_is_silence() {
        let worker = SyntheticWorker::new(PcmSpec::default());
        let synthesis = worker.process(&SpeechRequest::new("")).await.unwrap();
        let chunks = drain(&synthesis.stream);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), &[0u8; 320][..]);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let worker = SyntheticWorker::new(PcmSpec::default());
        let a = worker.process(&SpeechRequest::new("héllo")).await.unwrap();
        let b = worker.process(&SpeechRequest::new("héllo")).await.unwrap();
        assert_eq!(drain(&a.stream), drain(&b.stream));
    }
}
