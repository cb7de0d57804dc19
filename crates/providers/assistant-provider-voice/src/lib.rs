//! Speech provider for the assistant API
//!
//! Turns text into streamed, encoded audio:
//!
//! ```text
//! SpeechRequest -> SpeechWorker -> RawSamples -> PcmNormalizer -> AudioStream
//!               -> Encoder (PCM | MP3 | Opus) -> HTTP body chunks
//! ```
//!
//! ## Workers
//! - `tts:synthetic` - deterministic sawtooth audio, no dependencies
//! - `tts:piper` - Piper neural voices through the `piper` binary, with a
//!   one-slot model cache
//!
//! ## Formats
//! - `pcm` - raw s16le passthrough
//! - `mp3` - LAME, 128 kbps by default
//! - `opus` - 20 ms packets, 64 kbps by default

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod encoders;
pub mod pcm;
pub mod prewarm;
pub mod speech;
pub mod stream;
pub mod types;
pub mod workers;

pub use api::{router, ApiError, AppState};
pub use config::{AppSettings, AudioSettings, ServerSettings, TtsEngine, TtsSettings};
pub use encoders::{AudioEncoder, Encoder, EncoderSettings};
pub use pcm::{ByteOrder, PcmNormalizer, RawSamples, SampleMetadata};
pub use prewarm::{PrewarmManager, PrewarmRequest};
pub use speech::{encode_stream, synthesize_speech, validate_request, SpeechResponse};
pub use stream::{AudioStream, StreamMode, StreamRead};
pub use types::*;
pub use workers::{
    ModelCache, ModelStore, NeuralWorker, RawSampleSource, SpeechWorker, Synthesis, SyntheticWorker, VoiceModel,
    WorkerRegistry,
};
