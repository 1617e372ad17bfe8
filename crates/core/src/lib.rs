//! Core traits and types for the lead pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Lead/quote data model and closed enums (status, urgency, job type)
//! - Tagged lead-event types for the broadcast side
//! - Provider traits (STT, TTS, LLM, distance, SMS, store, cache)
//! - Transcript accumulation for live calls
//! - Telephony audio transcoding (PCM ⇄ µ-law, downsampling)
//! - Error taxonomy

pub mod audio;
pub mod error;
pub mod events;
pub mod lead;
pub mod traits;
pub mod transcript;

pub use error::{Error, Result};
pub use events::{LeadEvent, PipelineStep};
pub use lead::{
    BusinessProfile, JobType, LeadSession, LeadStatus, LineCategory, QuoteBreakdown, QuoteLine,
    QuoteLineItem, TradieDecision, TradieDecisionKind, Turn, TurnRole, UrgencyLevel,
};
pub use transcript::{TranscriptResult, UtteranceBuffer, WordTimestamp};

pub use traits::{
    AudioChunkStream, DistanceProvider, DistanceResult, LanguageModel, LeadStore, SmsOutcome,
    SmsSender, SnapshotCache, SpeechToText, SttEvent, SttSink, TextToSpeech,
};
