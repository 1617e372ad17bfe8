//! Transcript types and live-call utterance accumulation

use serde::{Deserialize, Serialize};

/// One word with timing information from the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTimestamp {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
    pub confidence: f32,
}

/// A transcription result, batch or streaming.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptResult {
    pub text: String,
    pub confidence: f32,
    /// Interim results are provisional and overwritten by the next fragment.
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordTimestamp>,
    #[serde(default)]
    pub duration_secs: f64,
}

/// Accumulates recognizer fragments for one utterance.
///
/// Final fragments append to the transcript and contribute to the running
/// confidence average; interim fragments only replace the provisional
/// buffer. `reset` clears everything, which is how the low-confidence
/// retry path discards a noisy utterance.
#[derive(Debug, Default, Clone)]
pub struct UtteranceBuffer {
    final_transcript: String,
    interim: String,
    confidence_sum: f32,
    confidence_count: u32,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a final fragment with its confidence score.
    pub fn push_final(&mut self, text: &str, confidence: f32) {
        if !self.final_transcript.is_empty() {
            self.final_transcript.push(' ');
        }
        self.final_transcript.push_str(text.trim());
        self.confidence_sum += confidence;
        self.confidence_count += 1;
    }

    /// Replace the provisional interim fragment.
    pub fn set_interim(&mut self, text: &str) {
        self.interim = text.to_string();
    }

    pub fn transcript(&self) -> &str {
        &self.final_transcript
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Running average confidence over final fragments; 0.0 before the
    /// first final fragment arrives.
    pub fn avg_confidence(&self) -> f32 {
        if self.confidence_count == 0 {
            return 0.0;
        }
        self.confidence_sum / self.confidence_count as f32
    }

    /// Whether there is enough accumulated speech to be worth processing.
    /// Very short fragments ("yes", line noise) are left to accumulate.
    pub fn is_substantial(&self) -> bool {
        self.final_transcript.trim().len() >= 5
    }

    /// Clear everything back to the empty state.
    pub fn reset(&mut self) {
        self.final_transcript.clear();
        self.interim.clear();
        self.confidence_sum = 0.0;
        self.confidence_count = 0;
    }
}
