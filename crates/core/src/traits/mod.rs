//! Trait seams for external collaborators
//!
//! Every outbound provider sits behind one of these traits so the
//! pipeline can be unit-tested with mocks and degrades cleanly when a
//! provider is unconfigured.

pub mod distance;
pub mod llm;
pub mod sms;
pub mod speech;
pub mod store;

pub use distance::{DistanceProvider, DistanceResult};
pub use llm::LanguageModel;
pub use sms::{SmsOutcome, SmsSender};
pub use speech::{AudioChunkStream, SpeechToText, SttEvent, SttSink, TextToSpeech};
pub use store::{LeadStore, SnapshotCache};
