//! One-slot voice model cache

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::pcm::RawSamples;
use crate::types::{PcmSpec, VoiceError};

/// How a model delivers the samples for one synthesis
#[derive(Debug)]
pub enum RawSampleSource {
    /// The whole utterance at once
    Bulk(RawSamples),
    /// Chunks as the engine produces them; the channel closing ends the utterance
    Incremental(mpsc::Receiver<Result<RawSamples, VoiceError>>),
}

/// A loaded voice, ready to synthesize
#[async_trait]
pub trait VoiceModel: Send + Sync {
    /// Voice this model was loaded for
    fn voice_id(&self) -> &str;

    /// Layout of the samples this model produces
    fn pcm_spec(&self) -> PcmSpec;

    /// Start synthesizing `text`
    async fn synthesize(&self, text: &str) -> Result<RawSampleSource, VoiceError>;
}

/// Loads voice models by id
///
/// `load` may block on filesystem or CPU work; callers run it on the blocking
/// pool.
pub trait ModelStore: Send + Sync + 'static {
    /// Load the model for `voice_id`
    fn load(&self, voice_id: &str) -> Result<Arc<dyn VoiceModel>, VoiceError>;
}

/// Holds at most one loaded model, keyed by voice id
///
/// Lookups of the cached voice only take the read lock. A miss serializes on
/// the load lock and re-checks the slot before loading, so concurrent misses
/// for one voice load it once. A failed load leaves the slot untouched.
pub struct ModelCache {
    store: Arc<dyn ModelStore>,
    slot: RwLock<Option<Arc<dyn VoiceModel>>>,
    load_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl ModelCache {
    /// Empty cache over `store`
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self {
            store,
            slot: RwLock::new(None),
            load_lock: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Model for `voice_id`, loading it (and evicting any other voice) on a miss
    pub async fn get(&self, voice_id: &str) -> Result<Arc<dyn VoiceModel>, VoiceError> {
        if let Some(model) = self.cached(voice_id).await {
            debug!(voice_id, "Reusing cached voice model");
            return Ok(model);
        }

        let _guard = self.load_lock.lock().await;
        if let Some(model) = self.cached(voice_id).await {
            debug!(voice_id, "Voice model loaded by a concurrent request");
            return Ok(model);
        }

        match self.current_voice().await {
            Some(previous) => info!(from = %previous, to = voice_id, "Switching voice model"),
            None => info!(voice_id, "Loading voice model"),
        }

        let store = Arc::clone(&self.store);
        let id = voice_id.to_string();
        let model = tokio::task::spawn_blocking(move || store.load(&id))
            .await
            .map_err(|e| VoiceError::Synthesis {
                voice_id: voice_id.to_string(),
                message: format!("model loader task failed: {}", e),
            })??;

        *self.slot.write().await = Some(Arc::clone(&model));
        self.loads.fetch_add(1, Ordering::Relaxed);
        info!(
            voice_id,
            sample_rate = model.pcm_spec().sample_rate(),
            "Voice model loaded"
        );
        Ok(model)
    }

    async fn cached(&self, voice_id: &str) -> Option<Arc<dyn VoiceModel>> {
        let slot = self.slot.read().await;
        slot.as_ref().filter(|model| model.voice_id() == voice_id).cloned()
    }

    /// Voice currently held, if any
    pub async fn current_voice(&self) -> Option<String> {
        self.slot.read().await.as_ref().map(|model| model.voice_id().to_string())
    }

    /// Drop the cached model
    pub async fn clear(&self) {
        let _guard = self.load_lock.lock().await;
        if let Some(model) = self.slot.write().await.take() {
            info!(voice_id = model.voice_id(), "Voice model released");
        }
    }

    /// Successful loads since creation
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}
