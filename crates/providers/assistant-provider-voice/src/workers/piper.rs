//! Piper neural TTS through the `piper` command-line binary
//!
//! Models live in one directory as `<voice>.onnx` with a sibling
//! `<voice>.onnx.json` describing the voice. Synthesis runs
//! `piper --model <voice>.onnx --output-raw`, feeds the text on stdin and
//! streams raw s16le mono PCM back from stdout.

use async_trait::async_trait;
use bytes::BytesMut;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::cache::{ModelStore, RawSampleSource, VoiceModel};
use crate::pcm::RawSamples;
use crate::types::{ModelUnavailableReason, PcmSpec, VoiceError};

/// Bytes requested per stdout read
const READ_CHUNK_BYTES: usize = 4096;

/// Chunks buffered between the reader task and the audio stream
const CHANNEL_CAPACITY: usize = 32;

/// Locate a Piper executable: explicit paths must exist, bare names are
/// searched on `PATH`
pub fn resolve_binary(binary: &Path) -> Option<PathBuf> {
    if binary.is_absolute() || binary.components().count() > 1 {
        return binary.is_file().then(|| binary.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Default, Deserialize)]
struct VoiceConfigFile {
    #[serde(default)]
    audio: VoiceAudioConfig,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceAudioConfig {
    sample_rate: Option<u32>,
}

/// Resolves voice ids to Piper model files
#[derive(Debug, Clone)]
pub struct PiperModelStore {
    binary: PathBuf,
    models_path: Option<PathBuf>,
    fallback_sample_rate: u32,
}

impl PiperModelStore {
    /// Store using `binary`, models under `models_path`, and
    /// `fallback_sample_rate` for voices without a readable config
    pub fn new(binary: PathBuf, models_path: Option<PathBuf>, fallback_sample_rate: u32) -> Self {
        Self {
            binary,
            models_path,
            fallback_sample_rate,
        }
    }

    fn unavailable(voice_id: &str, reason: ModelUnavailableReason, message: String) -> VoiceError {
        warn!(voice_id, %reason, "{}", message);
        VoiceError::ModelUnavailable {
            voice_id: voice_id.to_string(),
            reason,
            message,
        }
    }

    fn sample_rate_for(&self, model_path: &Path) -> u32 {
        let mut config_path = model_path.as_os_str().to_owned();
        config_path.push(".json");
        let config_path = PathBuf::from(config_path);

        let raw = match std::fs::read_to_string(&config_path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %config_path.display(), "No voice config, using default sample rate");
                return self.fallback_sample_rate;
            }
        };
        match serde_json::from_str::<VoiceConfigFile>(&raw) {
            Ok(config) => config
                .audio
                .sample_rate
                .filter(|rate| *rate > 0)
                .unwrap_or(self.fallback_sample_rate),
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Unreadable voice config, using default sample rate");
                self.fallback_sample_rate
            }
        }
    }
}

impl ModelStore for PiperModelStore {
    fn load(&self, voice_id: &str) -> Result<Arc<dyn VoiceModel>, VoiceError> {
        if !self.binary.is_file() {
            return Err(Self::unavailable(
                voice_id,
                ModelUnavailableReason::EngineMissing,
                format!("Piper binary not found at {}", self.binary.display()),
            ));
        }
        let models_path = self.models_path.as_ref().ok_or_else(|| {
            Self::unavailable(
                voice_id,
                ModelUnavailableReason::ConfigurationMissing,
                "tts.models_path is not configured".to_string(),
            )
        })?;
        let model_path = models_path.join(format!("{}.onnx", voice_id));
        if !model_path.is_file() {
            return Err(Self::unavailable(
                voice_id,
                ModelUnavailableReason::ModelFileMissing,
                format!("Piper model file not found: {}", model_path.display()),
            ));
        }

        let spec = PcmSpec::mono_16bit(self.sample_rate_for(&model_path))?;
        info!(voice_id, path = %model_path.display(), sample_rate = spec.sample_rate(), "Piper voice resolved");
        Ok(Arc::new(PiperVoiceModel {
            voice_id: voice_id.to_string(),
            binary: self.binary.clone(),
            model_path,
            spec,
        }))
    }
}

/// One Piper voice; each synthesis is a fresh `piper` process
#[derive(Debug, Clone)]
pub struct PiperVoiceModel {
    voice_id: String,
    binary: PathBuf,
    model_path: PathBuf,
    spec: PcmSpec,
}

impl PiperVoiceModel {
    /// Path of the `.onnx` model
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn command(&self) -> Command {
        // bundled releases ship their shared libraries next to the binary
        let lib_path = self.binary.parent().unwrap_or(&self.binary);
        let ld_path = format!(
            "{}:{}",
            lib_path.display(),
            std::env::var("LD_LIBRARY_PATH").unwrap_or_default()
        );

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--model")
            .arg(&self.model_path)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("LD_LIBRARY_PATH", ld_path)
            .kill_on_drop(true);
        cmd
    }

    fn failure(&self, message: impl Into<String>) -> VoiceError {
        VoiceError::Synthesis {
            voice_id: self.voice_id.clone(),
            message: message.into(),
        }
    }
}

/// Forward stdout in frame-aligned chunks; `Ok(false)` when the receiver is gone
async fn forward_stdout(
    mut stdout: ChildStdout,
    tx: &mpsc::Sender<Result<RawSamples, VoiceError>>,
    frame_bytes: usize,
) -> std::io::Result<bool> {
    let mut pending = BytesMut::with_capacity(READ_CHUNK_BYTES);
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
        let usable = pending.len() - pending.len() % frame_bytes;
        if usable == 0 {
            continue;
        }
        let chunk = pending.split_to(usable).freeze();
        if tx.send(Ok(RawSamples::Bytes(chunk))).await.is_err() {
            return Ok(false);
        }
    }
    if !pending.is_empty() {
        warn!(bytes = pending.len(), "Discarding trailing partial frame from Piper");
    }
    Ok(true)
}

#[async_trait]
impl VoiceModel for PiperVoiceModel {
    fn voice_id(&self) -> &str {
        &self.voice_id
    }

    fn pcm_spec(&self) -> PcmSpec {
        self.spec
    }

    async fn synthesize(&self, text: &str) -> Result<RawSampleSource, VoiceError> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| self.failure(format!("Failed to start Piper: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.failure("Piper stdout unavailable"))?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{}\n", text.trim_end());
            let voice_id = self.voice_id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    warn!(voice_id = %voice_id, error = %e, "Failed to write to Piper");
                }
            });
        }
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut out = String::new();
                let _ = stderr.read_to_string(&mut out).await;
                out
            })
        });

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let voice_id = self.voice_id.clone();
        let frame_bytes = self.spec.frame_bytes();
        tokio::spawn(async move {
            let forwarded = forward_stdout(stdout, &tx, frame_bytes).await;
            if let Ok(false) = forwarded {
                debug!(voice_id = %voice_id, "Audio consumer gone, stopping Piper");
                let _ = child.start_kill();
            }
            let status = child.wait().await;
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };

            let message = match (forwarded, status) {
                (Ok(false), _) => None,
                (Err(e), _) => Some(format!("Failed to read Piper output: {}", e)),
                (Ok(true), Err(e)) => Some(format!("Piper failed: {}", e)),
                (Ok(true), Ok(status)) if !status.success() => {
                    Some(format!("Piper exited with {}: {}", status, stderr.trim()))
                }
                (Ok(true), Ok(_)) => None,
            };
            if let Some(message) = message {
                warn!(voice_id = %voice_id, "{}", message);
                let _ = tx.send(Err(VoiceError::Synthesis { voice_id, message })).await;
            }
        });

        Ok(RawSampleSource::Incremental(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    fn store(dir: &Path, models: Option<PathBuf>) -> PiperModelStore {
        let binary = dir.join("piper");
        if !binary.exists() {
            touch(&binary);
        }
        PiperModelStore::new(binary, models, 16_000)
    }

    fn reason(err: VoiceError) -> ModelUnavailableReason {
        match err {
            VoiceError::ModelUnavailable { reason, .. } => reason,
            other => panic!("expected ModelUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let store = PiperModelStore::new(dir.path().join("nope"), Some(dir.path().to_path_buf()), 16_000);
        assert_eq!(reason(store.load("amy").err().unwrap()), ModelUnavailableReason::EngineMissing);
    }

    #[test]
    fn test_missing_models_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), None);
        assert_eq!(
            reason(store.load("amy").err().unwrap()),
            ModelUnavailableReason::ConfigurationMissing
        );
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Some(dir.path().to_path_buf()));
        assert_eq!(
            reason(store.load("amy").err().unwrap()),
            ModelUnavailableReason::ModelFileMissing
        );
    }

    #[test]
    fn test_sample_rate_from_voice_config() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("amy.onnx"));
        std::fs::write(
            dir.path().join("amy.onnx.json"),
            r#"{"audio": {"sample_rate": 22050, "quality": "low"}, "espeak": {"voice": "en-us"}}"#,
        )
        .unwrap();
        touch(&dir.path().join("ryan.onnx"));

        let store = store(dir.path(), Some(dir.path().to_path_buf()));
        let amy = store.load("amy").unwrap();
        assert_eq!(amy.voice_id(), "amy");
        assert_eq!(amy.pcm_spec(), PcmSpec::mono_16bit(22_050).unwrap());

        // no config: fallback rate
        let ryan = store.load("ryan").unwrap();
        assert_eq!(ryan.pcm_spec().sample_rate(), 16_000);
    }

    #[test]
    fn test_resolve_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("piper");
        assert!(resolve_binary(&binary).is_none());
        touch(&binary);
        assert_eq!(resolve_binary(&binary), Some(binary));
        assert!(resolve_binary(Path::new("definitely-not-a-real-piper-binary")).is_none());
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PiperModelStore {
        use std::os::unix::fs::PermissionsExt;

        let binary = dir.join("piper");
        std::fs::write(&binary, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        touch(&dir.join("amy.onnx"));
        PiperModelStore::new(binary, Some(dir.to_path_buf()), 16_000)
    }

    #[cfg(unix)]
    async fn collect(source: RawSampleSource) -> Vec<Result<RawSamples, VoiceError>> {
        let mut rx = match source {
            RawSampleSource::Incremental(rx) => rx,
            RawSampleSource::Bulk(_) => panic!("Piper output should be incremental"),
        };
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_aligned_stdout() {
        let dir = tempfile::tempdir().unwrap();
        // five bytes of output: the trailing odd byte is dropped
        let store = script(dir.path(), r"cat > /dev/null; printf '\001\000\002\000\003'");
        let model = store.load("amy").unwrap();

        let items = collect(model.synthesize("hello").await.unwrap()).await;
        let bytes: Vec<u8> = items
            .into_iter()
            .flat_map(|item| match item.unwrap() {
                RawSamples::Bytes(b) => b.to_vec(),
                other => panic!("unexpected {}", other.kind()),
            })
            .collect();
        assert_eq!(bytes, vec![1, 0, 2, 0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_synthesis_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = script(dir.path(), "cat > /dev/null; echo 'voice exploded' >&2; exit 3");
        let model = store.load("amy").unwrap();

        let items = collect(model.synthesize("hello").await.unwrap()).await;
        let err = items.into_iter().find_map(Result::err).unwrap();
        match err {
            VoiceError::Synthesis { voice_id, message } => {
                assert_eq!(voice_id, "amy");
                assert!(message.contains("voice exploded"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
