//! Streaming response assembly: worker PCM in, encoded body chunks out

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{debug, error};

use crate::encoders::{AudioEncoder, Encoder, EncoderSettings};
use crate::stream::AudioStream;
use crate::types::{AudioFormat, PcmSpec, SpeechRequest, VoiceError};
use crate::workers::{validate_voice_id, SpeechWorker, Synthesis};

/// Encoded speech ready to be written as a response body
pub struct SpeechResponse {
    /// Container of the body bytes
    pub format: AudioFormat,
    /// Layout of the PCM that was encoded
    pub pcm_spec: PcmSpec,
    /// Encoded chunks in order; an `Err` item ends the body
    pub body: BoxStream<'static, Result<Bytes, VoiceError>>,
}

impl SpeechResponse {
    /// MIME type of the body
    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

impl std::fmt::Debug for SpeechResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechResponse")
            .field("format", &self.format)
            .field("pcm_spec", &self.pcm_spec)
            .finish_non_exhaustive()
    }
}

/// Check a request before any synthesis work; returns the output format
pub fn validate_request(request: &SpeechRequest) -> Result<AudioFormat, VoiceError> {
    let format = AudioFormat::from_request(request.format.as_deref())?;
    if request.text.trim().is_empty() {
        return Err(VoiceError::EmptyText);
    }
    if let Some(voice) = request.voice.as_deref().filter(|v| !v.is_empty()) {
        validate_voice_id(voice)?;
    }
    Ok(format)
}

/// Validate, synthesize and set up encoding for one request
///
/// Returns once every fallible setup step has succeeded; the body then
/// encodes lazily as it is polled.
pub async fn synthesize_speech(
    worker: &dyn SpeechWorker,
    request: &SpeechRequest,
    settings: &EncoderSettings,
) -> Result<SpeechResponse, VoiceError> {
    let format = validate_request(request)?;
    let Synthesis { stream, pcm_spec } = worker.process(request).await?;
    let encoder = Encoder::for_format(format, pcm_spec, settings)?;
    debug!(
        worker = worker.worker_type(),
        format = %format,
        sample_rate = pcm_spec.sample_rate(),
        "Speech response ready"
    );

    Ok(SpeechResponse {
        format,
        pcm_spec,
        body: encode_stream(stream, encoder).boxed(),
    })
}

enum Phase<E> {
    Streaming {
        stream: AudioStream,
        encoder: E,
        bytes_out: usize,
    },
    Done,
}

/// Pull PCM from `stream`, encode it and yield non-empty encoded chunks,
/// ending with the encoder's flush output
pub fn encode_stream<E>(stream: AudioStream, encoder: E) -> impl Stream<Item = Result<Bytes, VoiceError>> + Send + 'static
where
    E: AudioEncoder + 'static,
{
    let initial = Phase::Streaming {
        stream,
        encoder,
        bytes_out: 0,
    };
    stream::unfold(initial, |phase| async move {
        let (stream, mut encoder, mut bytes_out) = match phase {
            Phase::Streaming {
                stream,
                encoder,
                bytes_out,
            } => (stream, encoder, bytes_out),
            Phase::Done => return None,
        };
        let format = encoder.output_format();

        loop {
            match stream.next_chunk().await {
                Ok(Some(pcm)) => match encoder.encode_chunk(&pcm) {
                    Ok(out) if out.is_empty() => continue,
                    Ok(out) => {
                        bytes_out += out.len();
                        let next = Phase::Streaming {
                            stream,
                            encoder,
                            bytes_out,
                        };
                        return Some((Ok(out), next));
                    }
                    Err(e) => {
                        error!(format = %format, error = %e, "Encoding failed mid-stream");
                        return Some((Err(e), Phase::Done));
                    }
                },
                Ok(None) => {
                    return match encoder.flush() {
                        Ok(Some(tail)) if !tail.is_empty() => {
                            debug!(format = %format, bytes = bytes_out + tail.len(), "Speech stream complete");
                            Some((Ok(tail), Phase::Done))
                        }
                        Ok(_) => {
                            debug!(format = %format, bytes = bytes_out, "Speech stream complete");
                            None
                        }
                        Err(e) => {
                            error!(format = %format, error = %e, "Encoder flush failed");
                            Some((Err(e), Phase::Done))
                        }
                    };
                }
                Err(e) => {
                    error!(format = %format, error = %e, "Synthesis failed mid-stream");
                    return Some((Err(e), Phase::Done));
                }
            }
        }
    })
}
