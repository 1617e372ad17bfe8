//! LLM-backed classification
//!
//! Asks the configured model for strict JSON, parses defensively, retries
//! the call once, and drops to the keyword classifier when the model is
//! unavailable or keeps returning something unparseable. The classifier as
//! a whole never fails a call over a bad model response.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use leadline_core::{JobType, LanguageModel, UrgencyLevel};

use crate::fallback::{classify_keywords, truncate_description};
use crate::Classification;

const SYSTEM_PROMPT: &str = r#"You are a job intake classifier for an Australian plumbing business.
Extract structured facts from the customer's message.

Respond with ONLY a JSON object, no prose, no markdown, with exactly these keys:
{
  "job_type": one of ["tap_repair", "tap_replacement", "toilet_repair", "toilet_replacement", "blocked_drain", "hot_water_repair", "hot_water_replacement", "leak_repair", "pipe_burst", "gas_fitting", "roof_plumbing", "bathroom_reno", "general_plumbing"],
  "address": string, the street address or suburb mentioned, or "unknown",
  "suburb": string or null,
  "urgency": one of ["emergency", "today", "tomorrow", "this_week", "flexible"],
  "description": string, one sentence summarising the problem,
  "parts_needed": array of strings, may be empty
}

Use "emergency" only for flooding, burst pipes, gas leaks or similar safety issues."#;

/// Raw shape the model is asked to produce. Kept separate from
/// `Classification` so lenient fields (nulls, unknown strings) can be
/// normalised before they reach the pipeline.
#[derive(Debug, Deserialize)]
struct RawClassification {
    job_type: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    suburb: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parts_needed: Vec<String>,
}

/// Classifier that prefers the model and falls back to keywords.
pub struct Classifier {
    model: Option<Arc<dyn LanguageModel>>,
}

impl Classifier {
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { model }
    }

    /// Keyword-only classifier, for tests and unconfigured deployments.
    pub fn keyword_only() -> Self {
        Self { model: None }
    }

    /// Classify a customer utterance. Total: always returns a
    /// classification, via the fallback when the model path fails.
    pub async fn classify(&self, text: &str) -> Classification {
        let Some(model) = &self.model else {
            return classify_keywords(text);
        };

        // One retry on top of the initial attempt.
        for attempt in 0..2 {
            match model.complete(SYSTEM_PROMPT, text).await {
                Ok(raw) => match parse_response(&raw, text) {
                    Some(classification) => {
                        debug!(
                            model = model.model_name(),
                            job_type = classification.job_type.as_str(),
                            "LLM classification succeeded"
                        );
                        return classification;
                    }
                    None => {
                        warn!(attempt, "LLM returned unparseable classification JSON");
                    }
                },
                Err(err) => {
                    warn!(attempt, error = %err, "LLM classification call failed");
                }
            }
        }

        warn!("falling back to keyword classification");
        classify_keywords(text)
    }
}

/// Parse the model's reply into a normalised classification. Unknown enum
/// strings degrade field-by-field rather than discarding the whole reply.
fn parse_response(raw: &str, original_text: &str) -> Option<Classification> {
    let json = strip_markdown_fences(raw);
    let parsed: RawClassification = serde_json::from_str(json).ok()?;

    let job_type = parsed.job_type.parse::<JobType>().unwrap_or_default();
    let urgency = parsed
        .urgency
        .as_deref()
        .and_then(|u| serde_json::from_value(serde_json::Value::String(u.to_string())).ok())
        .unwrap_or(UrgencyLevel::Flexible);

    let address = parsed
        .address
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let description = parsed
        .description
        .filter(|d| !d.trim().is_empty())
        .map(|d| truncate_description(&d))
        .unwrap_or_else(|| truncate_description(original_text));

    Some(Classification {
        job_type,
        address,
        suburb: parsed.suburb.filter(|s| !s.trim().is_empty()),
        urgency,
        description,
        parts_needed: parsed.parts_needed,
    })
}

/// Models often wrap JSON in ```json fences despite instructions.
fn strip_markdown_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
