//! Job classification
//!
//! Turns a customer's free-text description into a structured
//! [`Classification`]. The model path extracts richer detail; the keyword
//! path guarantees the pipeline always gets an answer.

pub mod fallback;
pub mod llm;

pub use fallback::classify_keywords;
pub use llm::Classifier;

use serde::{Deserialize, Serialize};

use leadline_core::{JobType, UrgencyLevel};

/// Structured facts extracted from one customer utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub job_type: JobType,
    /// Best-effort address text; "unknown" when nothing was mentioned.
    pub address: String,
    pub suburb: Option<String>,
    pub urgency: UrgencyLevel,
    /// Summary of the problem, capped at 200 characters.
    pub description: String,
    #[serde(default)]
    pub parts_needed: Vec<String>,
}
