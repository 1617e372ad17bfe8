//! Speech provider traits
//!
//! Streaming recognition is split into a sink half (audio in) and an
//! event receiver (transcripts out) so a call session can forward audio
//! and consume events from the same `select!` loop.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::transcript::TranscriptResult;

/// Events emitted by a streaming recognizer connection.
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// A transcript fragment. Interim fragments (`is_final = false`) are
    /// provisional and overwritten; final fragments accumulate.
    Transcript {
        text: String,
        confidence: f32,
        is_final: bool,
    },
    /// The caller has paused past the trailing-silence threshold.
    /// This, not the absence of audio, is the utterance boundary.
    UtteranceEnd,
    SpeechStarted,
    /// The provider closed the connection.
    Closed,
}

/// The audio-in half of a streaming recognizer connection.
#[async_trait]
pub trait SttSink: Send + Sync {
    /// Forward one audio chunk (µ-law 8kHz on the telephony leg).
    async fn send_audio(&self, chunk: &[u8]) -> Result<()>;

    /// Close the connection. Idempotent; must be called on every call
    /// exit path.
    async fn close(&self);
}

/// Speech-to-text interface: batch transcription plus streaming sessions.
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe a complete recording.
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<TranscriptResult>;

    /// Transcribe a hosted recording by URL. Implementations retry once
    /// with a short delay to ride out provider processing lag.
    async fn transcribe_url(&self, url: &str) -> Result<TranscriptResult>;

    /// Open a streaming recognition session tuned for the target locale
    /// and domain vocabulary.
    async fn open_stream(&self) -> Result<(Box<dyn SttSink>, mpsc::Receiver<SttEvent>)>;

    fn model_name(&self) -> &str;
}

/// A stream of synthesized audio chunks, cancellable mid-stream by
/// dropping it (barge-in).
pub type AudioChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Text-to-speech interface.
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize the full utterance into one buffer.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Stream synthesis as µ-law 8kHz chunks for the media stream.
    async fn stream(&self, text: &str) -> Result<AudioChunkStream>;

    fn voice_name(&self) -> &str;
}
