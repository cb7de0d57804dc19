use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::cache::{ModelCache, RawSampleSource};
use super::{validate_voice_id, SpeechWorker, Synthesis};
use crate::pcm::{PcmNormalizer, RawSamples};
use crate::stream::AudioStream;
use crate::types::{ModelUnavailableReason, SpeechRequest, VoiceError};

/// Worker backed by a neural voice model held in a [`ModelCache`]
pub struct NeuralWorker {
    worker_type: &'static str,
    cache: Arc<ModelCache>,
    default_voice: Option<String>,
    chunk_size: usize,
}

impl NeuralWorker {
    /// Create a worker; `chunk_size` bounds the chunks bulk output is split into
    pub fn new(
        worker_type: &'static str,
        cache: Arc<ModelCache>,
        default_voice: Option<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            worker_type,
            cache,
            default_voice,
            chunk_size,
        }
    }

    /// The model cache this worker loads through
    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    fn resolve_voice(&self, requested: Option<&str>) -> Result<String, VoiceError> {
        let voice = requested
            .filter(|v| !v.trim().is_empty())
            .or(self.default_voice.as_deref())
            .ok_or_else(|| VoiceError::ModelUnavailable {
                voice_id: String::new(),
                reason: ModelUnavailableReason::ConfigurationMissing,
                message: "no voice requested and no default_model configured".to_string(),
            })?;
        validate_voice_id(voice)?;
        Ok(voice.to_string())
    }
}

fn synthesis_error(voice_id: &str, err: VoiceError) -> VoiceError {
    match err {
        VoiceError::Synthesis { .. } => err,
        other => VoiceError::Synthesis {
            voice_id: voice_id.to_string(),
            message: other.to_string(),
        },
    }
}

/// Largest multiple of `frame_bytes` not above `chunk_size`, at least one frame
fn aligned_chunk_size(chunk_size: usize, frame_bytes: usize) -> usize {
    (chunk_size - chunk_size % frame_bytes).max(frame_bytes)
}

fn push_bulk(stream: &AudioStream, pcm: Bytes, chunk_size: usize) -> Result<usize, VoiceError> {
    let step = aligned_chunk_size(chunk_size, stream.pcm_spec().frame_bytes());
    let mut chunks = 0;
    let mut offset = 0;
    while offset < pcm.len() {
        let end = (offset + step).min(pcm.len());
        stream.push_pcm(pcm.slice(offset..end))?;
        offset = end;
        chunks += 1;
    }
    Ok(chunks)
}

async fn pump_incremental(
    mut rx: mpsc::Receiver<Result<RawSamples, VoiceError>>,
    stream: AudioStream,
    normalizer: PcmNormalizer,
    voice_id: String,
) {
    let mut chunks = 0usize;
    while let Some(item) = rx.recv().await {
        match item.and_then(|raw| normalizer.normalize(raw)) {
            Ok(pcm) if pcm.is_empty() => continue,
            Ok(pcm) => {
                if let Err(e) = stream.push_pcm(pcm) {
                    warn!(voice_id = %voice_id, error = %e, "Dropping synthesis output");
                    break;
                }
                chunks += 1;
            }
            Err(e) => {
                warn!(voice_id = %voice_id, error = %e, "Incremental synthesis failed");
                stream.abort(synthesis_error(&voice_id, e));
                return;
            }
        }
    }
    stream.close();
    debug!(voice_id = %voice_id, chunks, bytes = stream.pushed_bytes(), "Incremental synthesis finished");
}

#[async_trait]
impl SpeechWorker for NeuralWorker {
    fn worker_type(&self) -> &'static str {
        self.worker_type
    }

    async fn process(&self, request: &SpeechRequest) -> Result<Synthesis, VoiceError> {
        let voice_id = self.resolve_voice(request.voice.as_deref())?;
        let model = self.cache.get(&voice_id).await?;
        let spec = model.pcm_spec();
        let normalizer = PcmNormalizer::new(spec)?;

        info!(voice_id = %voice_id, sample_rate = spec.sample_rate(), "Synthesizing speech");
        let stream = match model.synthesize(&request.text).await? {
            RawSampleSource::Bulk(raw) => {
                let pcm = normalizer
                    .normalize(raw)
                    .map_err(|e| synthesis_error(&voice_id, e))?;
                let stream = AudioStream::buffered(spec);
                let chunks = push_bulk(&stream, pcm, self.chunk_size)?;
                stream.close();
                debug!(voice_id = %voice_id, chunks, bytes = stream.pushed_bytes(), "Bulk synthesis buffered");
                stream
            }
            RawSampleSource::Incremental(rx) => {
                let stream = AudioStream::live(spec);
                tokio::spawn(pump_incremental(rx, stream.clone(), normalizer, voice_id.clone()));
                stream
            }
        };

        Ok(Synthesis { stream, pcm_spec: spec })
    }

    async fn preload(&self, voice: Option<&str>) -> Result<(), VoiceError> {
        let voice_id = self.resolve_voice(voice)?;
        self.cache.get(&voice_id).await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.cache.clear().await;
    }
}
