//! Speech workers: text in, PCM [`AudioStream`] out
//!
//! Workers know nothing about HTTP or codecs. The server picks one worker at
//! startup through [`WorkerRegistry`] and shares it across requests.

mod cache;
mod neural;
mod piper;
mod synthetic;

pub use cache::{ModelCache, ModelStore, RawSampleSource, VoiceModel};
pub use neural::NeuralWorker;
pub use piper::{resolve_binary, PiperModelStore, PiperVoiceModel};
pub use synthetic::SyntheticWorker;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AudioSettings, TtsEngine, TtsSettings};
use crate::stream::AudioStream;
use crate::types::{PcmSpec, SpeechRequest, VoiceError};

/// Worker type of [`SyntheticWorker`]
pub const SYNTHETIC_WORKER_TYPE: &str = "tts:synthetic";

/// Worker type of the Piper-backed [`NeuralWorker`]
pub const PIPER_WORKER_TYPE: &str = "tts:piper";

/// Output of one synthesis call
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// PCM produced for the request
    pub stream: AudioStream,
    /// Layout of the PCM in `stream`
    pub pcm_spec: PcmSpec,
}

/// Produces PCM audio for a speech request
#[async_trait]
pub trait SpeechWorker: Send + Sync {
    /// Stable identifier, e.g. `tts:piper`
    fn worker_type(&self) -> &'static str;

    /// Start synthesis and return the stream the audio arrives on
    ///
    /// Every fallible setup step (model load, process spawn) completes before
    /// this returns.
    async fn process(&self, request: &SpeechRequest) -> Result<Synthesis, VoiceError>;

    /// Load `voice` (or the default voice) ahead of the first request
    async fn preload(&self, _voice: Option<&str>) -> Result<(), VoiceError> {
        Ok(())
    }

    /// Release resources held by the worker
    async fn shutdown(&self) {}
}

/// Reject voice ids that could escape the models directory
pub fn validate_voice_id(voice_id: &str) -> Result<(), VoiceError> {
    if voice_id.trim().is_empty() || voice_id.contains(['/', '\\']) || voice_id.contains("..") {
        return Err(VoiceError::InvalidVoice(voice_id.to_string()));
    }
    Ok(())
}

/// Workers available to the server, keyed by worker type
#[derive(Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<&'static str, Arc<dyn SpeechWorker>>,
}

impl WorkerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the synthetic worker plus Piper when it is configured
    /// and its binary can be found
    pub fn from_settings(tts: &TtsSettings, audio: &AudioSettings) -> Result<Self, VoiceError> {
        let mut registry = Self::new();
        registry.register(Arc::new(SyntheticWorker::new(audio.pcm_spec()?)));

        if tts.engine == TtsEngine::Piper {
            match resolve_binary(&tts.piper_binary) {
                Some(binary) => {
                    let store = PiperModelStore::new(binary, tts.models_path.clone(), audio.sample_rate);
                    let worker = NeuralWorker::new(
                        PIPER_WORKER_TYPE,
                        Arc::new(ModelCache::new(Arc::new(store))),
                        tts.default_model.clone(),
                        tts.chunk_size,
                    );
                    registry.register(Arc::new(worker));
                }
                None => warn!(
                    binary = %tts.piper_binary.display(),
                    "Piper binary not found; Piper worker unavailable"
                ),
            }
        }
        Ok(registry)
    }

    /// Add or replace a worker under its declared type
    pub fn register(&mut self, worker: Arc<dyn SpeechWorker>) {
        self.workers.insert(worker.worker_type(), worker);
    }

    /// Worker registered under `worker_type`
    pub fn get(&self, worker_type: &str) -> Option<Arc<dyn SpeechWorker>> {
        self.workers.get(worker_type).cloned()
    }

    /// Registered worker types in sorted order
    pub fn list_types(&self) -> Vec<&'static str> {
        self.workers.keys().copied().collect()
    }

    /// Worker serving `engine`, falling back to the synthetic worker when the
    /// engine's worker is not registered
    pub fn select(&self, engine: TtsEngine) -> Option<Arc<dyn SpeechWorker>> {
        let wanted = match engine {
            TtsEngine::Synthetic => SYNTHETIC_WORKER_TYPE,
            TtsEngine::Piper => PIPER_WORKER_TYPE,
        };
        if let Some(worker) = self.get(wanted) {
            info!(worker = wanted, "Speech worker selected");
            return Some(worker);
        }
        warn!(
            requested = wanted,
            fallback = SYNTHETIC_WORKER_TYPE,
            "Requested speech worker unavailable, falling back"
        );
        self.get(SYNTHETIC_WORKER_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_voice_id_validation() {
        assert!(validate_voice_id("en_US-amy-low").is_ok());
        for bad in ["", "  ", "../etc/passwd", "voices/amy", "a\\b", "x..y"] {
            assert!(
                matches!(validate_voice_id(bad), Err(VoiceError::InvalidVoice(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_registry_synthetic_by_default() {
        let registry = WorkerRegistry::from_settings(&TtsSettings::default(), &AudioSettings::default()).unwrap();
        assert_eq!(registry.list_types(), vec![SYNTHETIC_WORKER_TYPE]);

        let worker = registry.select(TtsEngine::Synthetic).unwrap();
        assert_eq!(worker.worker_type(), SYNTHETIC_WORKER_TYPE);
    }

    #[test]
    fn test_missing_piper_binary_falls_back() {
        let tts = TtsSettings {
            engine: TtsEngine::Piper,
            piper_binary: PathBuf::from("/nonexistent/bin/piper"),
            ..TtsSettings::default()
        };
        let registry = WorkerRegistry::from_settings(&tts, &AudioSettings::default()).unwrap();
        assert!(registry.get(PIPER_WORKER_TYPE).is_none());

        let worker = registry.select(TtsEngine::Piper).unwrap();
        assert_eq!(worker.worker_type(), SYNTHETIC_WORKER_TYPE);
    }

    #[test]
    fn test_registered_piper_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("piper");
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();

        let tts = TtsSettings {
            engine: TtsEngine::Piper,
            piper_binary: binary,
            models_path: Some(dir.path().to_path_buf()),
            ..TtsSettings::default()
        };
        let registry = WorkerRegistry::from_settings(&tts, &AudioSettings::default()).unwrap();
        assert_eq!(registry.list_types(), vec![PIPER_WORKER_TYPE, SYNTHETIC_WORKER_TYPE]);
        assert_eq!(registry.select(TtsEngine::Piper).unwrap().worker_type(), PIPER_WORKER_TYPE);
    }
}
