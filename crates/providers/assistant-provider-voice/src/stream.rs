//! PCM audio streams between a speech worker and the response encoder
//!
//! A worker pushes canonical PCM chunks; the response side pulls them. Reads
//! are three-way ([`StreamRead`]) so "nothing yet" is never confused with
//! "finished":
//!
//! - [`StreamMode::Buffered`]: production completes before reading starts, so
//!   an empty queue always means the end.
//! - [`StreamMode::Live`]: reads interleave with pushes; an empty queue on an
//!   open stream is [`StreamRead::Pending`].

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::types::{AudioFormat, PcmSpec, VoiceError};

/// How reads relate to writes on a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// All chunks are pushed and the stream closed before any read
    Buffered,
    /// Reads may start while the producer is still pushing
    Live,
}

/// Result of a non-blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRead {
    /// Next chunk in push order
    Chunk(Bytes),
    /// Queue empty but the producer has not closed the stream
    Pending,
    /// Closed and fully drained
    Finished,
}

#[derive(Debug, Default)]
struct StreamState {
    queue: VecDeque<Bytes>,
    closed: bool,
    failure: Option<VoiceError>,
    pushed_bytes: usize,
}

#[derive(Debug)]
struct StreamInner {
    state: Mutex<StreamState>,
    notify: Notify,
}

/// FIFO of canonical PCM chunks with an explicit closed state
///
/// Cloning yields another handle to the same stream so a producer task and the
/// consumer can each hold one.
#[derive(Debug, Clone)]
pub struct AudioStream {
    inner: Arc<StreamInner>,
    mode: StreamMode,
    spec: PcmSpec,
}

impl AudioStream {
    /// Create an open, empty stream
    pub fn new(mode: StreamMode, spec: PcmSpec) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                state: Mutex::new(StreamState::default()),
                notify: Notify::new(),
            }),
            mode,
            spec,
        }
    }

    /// Stream filled completely before it is read
    pub fn buffered(spec: PcmSpec) -> Self {
        Self::new(StreamMode::Buffered, spec)
    }

    /// Stream read while it is being filled
    pub fn live(spec: PcmSpec) -> Self {
        Self::new(StreamMode::Live, spec)
    }

    /// Read/write relationship of this stream
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Layout of the PCM carried by this stream
    pub fn pcm_spec(&self) -> PcmSpec {
        self.spec
    }

    /// Chunks read from the stream are raw PCM
    pub fn output_format(&self) -> AudioFormat {
        AudioFormat::Pcm
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue one PCM chunk; never blocks
    pub fn push_pcm(&self, chunk: impl Into<Bytes>) -> Result<(), VoiceError> {
        let chunk = chunk.into();
        if !self.spec.is_aligned(chunk.len()) {
            return Err(VoiceError::MisalignedChunk {
                len: chunk.len(),
                frame_bytes: self.spec.frame_bytes(),
            });
        }
        {
            let mut state = self.state();
            if state.closed {
                return Err(VoiceError::StreamClosed);
            }
            state.pushed_bytes += chunk.len();
            state.queue.push_back(chunk);
        }
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Mark the end of production; further calls are no-ops
    pub fn close(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.inner.notify.notify_one();
    }

    /// Close the stream recording a producer failure
    ///
    /// Queued chunks remain readable; the failure is returned once they are
    /// drained.
    pub fn abort(&self, error: VoiceError) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.failure = Some(error);
            state.closed = true;
        }
        self.inner.notify.notify_one();
    }

    /// Whether `close` (or `abort`) has been called
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Total PCM bytes accepted so far
    pub fn pushed_bytes(&self) -> usize {
        self.state().pushed_bytes
    }

    /// Take the next chunk without waiting
    pub fn read_encoded(&self) -> Result<StreamRead, VoiceError> {
        let mut state = self.state();
        if let Some(chunk) = state.queue.pop_front() {
            return Ok(StreamRead::Chunk(chunk));
        }
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        match self.mode {
            StreamMode::Buffered => Ok(StreamRead::Finished),
            StreamMode::Live if state.closed => Ok(StreamRead::Finished),
            StreamMode::Live => Ok(StreamRead::Pending),
        }
    }

    /// Wait for the next chunk; `None` once the stream is finished
    pub async fn next_chunk(&self) -> Result<Option<Bytes>, VoiceError> {
        loop {
            let notified = self.inner.notify.notified();
            match self.read_encoded()? {
                StreamRead::Chunk(chunk) => return Ok(Some(chunk)),
                StreamRead::Finished => return Ok(None),
                StreamRead::Pending => notified.await,
            }
        }
    }
}
