//! Deterministic keyword classifier
//!
//! Used whenever no language model is configured or the model's output
//! cannot be parsed. Total: every input maps to a classification, with
//! `general_plumbing` / `flexible` as the defaults.

use once_cell::sync::Lazy;
use regex::Regex;

use leadline_core::{JobType, UrgencyLevel};

use crate::Classification;

/// Job keywords in priority order. The first phrase found in the text
/// wins, so more specific phrases sit above generic ones.
const JOB_KEYWORDS: &[(&str, JobType)] = &[
    ("burst pipe", JobType::PipeBurst),
    ("pipe burst", JobType::PipeBurst),
    ("burst", JobType::PipeBurst),
    ("gas leak", JobType::GasFitting),
    ("gas fitting", JobType::GasFitting),
    ("gas", JobType::GasFitting),
    ("no hot water", JobType::HotWaterRepair),
    ("hot water system replace", JobType::HotWaterReplacement),
    ("new hot water", JobType::HotWaterReplacement),
    ("hot water", JobType::HotWaterRepair),
    ("water heater", JobType::HotWaterRepair),
    ("blocked drain", JobType::BlockedDrain),
    ("blocked toilet", JobType::BlockedDrain),
    ("blocked", JobType::BlockedDrain),
    ("clogged", JobType::BlockedDrain),
    ("drain", JobType::BlockedDrain),
    ("toilet replace", JobType::ToiletReplacement),
    ("new toilet", JobType::ToiletReplacement),
    ("toilet", JobType::ToiletRepair),
    ("cistern", JobType::ToiletRepair),
    ("tap replace", JobType::TapReplacement),
    ("new tap", JobType::TapReplacement),
    ("new mixer", JobType::TapReplacement),
    ("dripping tap", JobType::TapRepair),
    ("leaking tap", JobType::TapRepair),
    ("tap", JobType::TapRepair),
    ("faucet", JobType::TapRepair),
    ("roof", JobType::RoofPlumbing),
    ("gutter", JobType::RoofPlumbing),
    ("downpipe", JobType::RoofPlumbing),
    ("bathroom reno", JobType::BathroomReno),
    ("renovat", JobType::BathroomReno),
    ("leak", JobType::LeakRepair),
];

/// Urgency keywords, most urgent first. Safety language always wins.
const URGENCY_KEYWORDS: &[(&str, UrgencyLevel)] = &[
    ("flood", UrgencyLevel::Emergency),
    ("gushing", UrgencyLevel::Emergency),
    ("pouring", UrgencyLevel::Emergency),
    ("burst", UrgencyLevel::Emergency),
    ("gas leak", UrgencyLevel::Emergency),
    ("emergency", UrgencyLevel::Emergency),
    ("right now", UrgencyLevel::Today),
    ("straight away", UrgencyLevel::Today),
    ("asap", UrgencyLevel::Today),
    ("urgent", UrgencyLevel::Today),
    ("today", UrgencyLevel::Today),
    ("tomorrow", UrgencyLevel::Tomorrow),
    ("this week", UrgencyLevel::ThisWeek),
    ("next few days", UrgencyLevel::ThisWeek),
];

/// Gold Coast suburbs recognised without geocoding.
const SUBURBS: &[&str] = &[
    "southport",
    "surfers paradise",
    "broadbeach",
    "burleigh heads",
    "burleigh",
    "palm beach",
    "currumbin",
    "coolangatta",
    "robina",
    "varsity lakes",
    "mermaid beach",
    "mermaid waters",
    "miami",
    "nerang",
    "ashmore",
    "benowa",
    "bundall",
    "carrara",
    "helensvale",
    "hope island",
    "labrador",
    "main beach",
    "mudgeeraba",
    "nobby beach",
    "oxenford",
    "pacific pines",
    "parkwood",
    "runaway bay",
    "tallebudgera",
    "tugun",
    "upper coomera",
    "coomera",
    "worongary",
    "elanora",
    "arundel",
    "biggera waters",
];

/// Street address like "12 Smith St" or "4/38 Marine Parade".
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d+[a-z]?(?:/\d+[a-z]?)?\s+[a-z][a-z']*(?:\s+[a-z][a-z']*)?\s+(?:street|st|road|rd|avenue|ave|drive|dr|court|ct|parade|pde|place|pl|crescent|cres|boulevard|blvd|way|lane|ln|terrace|tce|esplanade|circuit|cct|highway|hwy))\b",
    )
    .expect("address pattern compiles")
});

const MAX_DESCRIPTION_LEN: usize = 200;

/// Classify using keyword tables only. Never fails.
pub fn classify_keywords(text: &str) -> Classification {
    let lower = text.to_lowercase();

    let job_type = JOB_KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|&(_, job)| job)
        .unwrap_or_default();

    let urgency = URGENCY_KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|&(_, level)| level)
        .unwrap_or_default();

    let suburb = SUBURBS
        .iter()
        .find(|s| lower.contains(*s))
        .map(|s| title_case(s));

    let address = ADDRESS_RE
        .find(&lower)
        .map(|m| match &suburb {
            Some(sub) => format!("{}, {sub}", title_case(m.as_str())),
            None => title_case(m.as_str()),
        })
        .or_else(|| suburb.clone())
        .unwrap_or_else(|| "unknown".to_string());

    Classification {
        job_type,
        address,
        suburb,
        urgency,
        description: truncate_description(text),
        parts_needed: Vec::new(),
    }
}

/// Cap the stored description so one rambling utterance cannot bloat the
/// lead record.
pub fn truncate_description(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_DESCRIPTION_LEN {
        return trimmed.to_string();
    }
    trimmed.chars().take(MAX_DESCRIPTION_LEN).collect()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
