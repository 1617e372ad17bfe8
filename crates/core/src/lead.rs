//! Lead pipeline data model
//!
//! `BusinessProfile`, `LeadSession` and `QuoteLineItem` plus the closed
//! enums that drive the lifecycle. Leads are never hard-deleted; they move
//! to a terminal status instead.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Closed enums
// ---------------------------------------------------------------------------

/// State machine for a lead session.
///
/// `NEW → DETAILS_COLLECTED → MEDIA_PENDING → PRICING → TRADIE_REVIEW →
/// {CONFIRMED → BOOKED} | REJECTED | CANCELLED`. Forward-only, except the
/// quote-edit loop which stays in `TRADIE_REVIEW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    DetailsCollected,
    MediaPending,
    Pricing,
    TradieReview,
    Confirmed,
    Booked,
    Rejected,
    Cancelled,
}

impl LeadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::DetailsCollected => 1,
            Self::MediaPending => 2,
            Self::Pricing => 3,
            Self::TradieReview => 4,
            Self::Confirmed => 5,
            Self::Booked => 6,
            Self::Rejected | Self::Cancelled => u8::MAX,
        }
    }

    /// Whether a transition to `next` is legal. Terminal states accept
    /// nothing; intermediate states may be skipped (a lead with no phone
    /// number never enters `MEDIA_PENDING`) but the status never moves
    /// backward.
    pub fn can_transition(self, next: LeadStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Rejected | Self::Cancelled => true,
            Self::TradieReview if self == Self::TradieReview => true, // quote edit loop
            _ => next.rank() > self.rank(),
        }
    }
}

/// How soon the customer needs the job done. "Emergency" is reserved for
/// flooding, burst pipes, gas leaks and other safety language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Emergency,
    Today,
    Tomorrow,
    ThisWeek,
    #[default]
    Flexible,
}

/// The closed set of job types the classifier may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    TapRepair,
    TapReplacement,
    ToiletRepair,
    ToiletReplacement,
    BlockedDrain,
    HotWaterRepair,
    HotWaterReplacement,
    LeakRepair,
    PipeBurst,
    GasFitting,
    RoofPlumbing,
    BathroomReno,
    #[default]
    GeneralPlumbing,
}

impl JobType {
    /// Snake-case wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TapRepair => "tap_repair",
            Self::TapReplacement => "tap_replacement",
            Self::ToiletRepair => "toilet_repair",
            Self::ToiletReplacement => "toilet_replacement",
            Self::BlockedDrain => "blocked_drain",
            Self::HotWaterRepair => "hot_water_repair",
            Self::HotWaterReplacement => "hot_water_replacement",
            Self::LeakRepair => "leak_repair",
            Self::PipeBurst => "pipe_burst",
            Self::GasFitting => "gas_fitting",
            Self::RoofPlumbing => "roof_plumbing",
            Self::BathroomReno => "bathroom_reno",
            Self::GeneralPlumbing => "general_plumbing",
        }
    }

    /// Human wording for spoken responses ("pipe burst", "blocked drain").
    pub fn display_name(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl std::str::FromStr for JobType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| crate::Error::Validation(format!("unknown job type: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Quote types
// ---------------------------------------------------------------------------

/// Category of a quote line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCategory {
    Callout,
    Labour,
    Parts,
    Travel,
    Gst,
}

/// One priced component of a quote breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub category: LineCategory,
    pub label: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The itemised, GST-inclusive breakdown computed by the quote engine.
/// Subtotal, GST and total are derived from the already-rounded line
/// totals so the breakdown stays internally consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    pub line_items: Vec<QuoteLine>,
    pub subtotal: f64,
    pub gst: f64,
    pub total: f64,
    pub currency: String,
}

/// A persisted quote line, owned by exactly one lead. Immutable once
/// written; corrections produce a new snapshot rather than an edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub id: String,
    pub lead_id: String,
    #[serde(flatten)]
    pub line: QuoteLine,
}

impl QuoteLineItem {
    pub fn from_line(lead_id: &str, line: QuoteLine) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: lead_id.to_string(),
            line,
        }
    }
}

// ---------------------------------------------------------------------------
// BusinessProfile
// ---------------------------------------------------------------------------

/// The service provider's pricing and scheduling facts. Read-heavy by the
/// pipeline, mutated only by the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub id: String,
    pub business_name: String,
    pub base_address: String,
    pub base_lat: Option<f64>,
    pub base_lng: Option<f64>,
    /// Jobs further than this are declined. Always ≥ 0.
    pub service_radius_km: f64,
    pub callout_fee: f64,
    pub hourly_rate: f64,
    pub min_labour_hours: f64,
    /// Percentage markup on parts, e.g. 15.0.
    pub markup_pct: f64,
    pub travel_rate_per_km: f64,
    /// IANA timezone, e.g. "Australia/Brisbane".
    pub timezone: String,
    /// Weekly availability: day → "HH:MM-HH:MM" ranges, non-overlapping.
    #[serde(default)]
    pub working_hours: HashMap<String, Vec<String>>,
    /// Display strings for the next bookable slots, spoken to callers.
    #[serde(default)]
    pub next_available_slots: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessProfile {
    pub fn new(id: impl Into<String>, business_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            business_name: business_name.into(),
            base_address: String::new(),
            base_lat: None,
            base_lng: None,
            service_radius_km: 30.0,
            callout_fee: 80.0,
            hourly_rate: 95.0,
            min_labour_hours: 1.0,
            markup_pct: 15.0,
            travel_rate_per_km: 1.50,
            timezone: "Australia/Brisbane".to_string(),
            working_hours: HashMap::new(),
            next_available_slots: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Customer,
    Assistant,
    System,
}

/// One entry in a lead's append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn now(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// LeadSession
// ---------------------------------------------------------------------------

/// A single inbound contact's full lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSession {
    pub id: String,
    pub business_id: String,
    pub status: LeadStatus,

    // Customer
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub customer_lat: Option<f64>,
    pub customer_lng: Option<f64>,

    // Job
    pub job_type: Option<JobType>,
    pub job_description: String,
    pub urgency: UrgencyLevel,

    // Media
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_analysis: Option<serde_json::Value>,

    // Pricing snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_snapshot: Option<QuoteBreakdown>,
    pub quote_total: Option<f64>,
    pub distance_km: Option<f64>,
    pub travel_minutes: Option<u32>,

    // Tradie decision (edited quote kept alongside the original for audit)
    pub tradie_decision: Option<TradieDecisionKind>,
    pub tradie_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tradie_edited_quote: Option<QuoteBreakdown>,

    // Booking
    pub booked_date: Option<String>,
    pub booked_time_slot: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,

    /// Append-only conversation history.
    #[serde(default)]
    pub conversation: Vec<Turn>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadSession {
    pub fn new(business_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.into(),
            status: LeadStatus::New,
            customer_name: String::new(),
            customer_phone: String::new(),
            customer_address: String::new(),
            customer_lat: None,
            customer_lng: None,
            job_type: None,
            job_description: String::new(),
            urgency: UrgencyLevel::Flexible,
            photo_urls: Vec::new(),
            photo_analysis: None,
            quote_snapshot: None,
            quote_total: None,
            distance_km: None,
            travel_minutes: None,
            tradie_decision: None,
            tradie_notes: None,
            tradie_edited_quote: None,
            booked_date: None,
            booked_time_slot: None,
            booked_at: None,
            conversation: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a conversation turn and bump `updated_at`.
    pub fn push_turn(&mut self, role: TurnRole, text: impl Into<String>) {
        self.conversation.push(Turn::now(role, text));
        self.updated_at = Utc::now();
    }

    /// Advance the lifecycle, rejecting illegal transitions.
    pub fn transition(&mut self, next: LeadStatus) -> crate::Result<()> {
        if !self.status.can_transition(next) {
            return Err(crate::Error::Conflict(format!(
                "lead {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The quote shown to clients: a tradie edit takes precedence over
    /// the original snapshot, but both remain stored.
    pub fn display_quote(&self) -> Option<&QuoteBreakdown> {
        self.tradie_edited_quote
            .as_ref()
            .or(self.quote_snapshot.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Tradie decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradieDecisionKind {
    Approve,
    Edit,
    Reject,
}

/// The owner's decision on a lead in review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradieDecision {
    pub decision: TradieDecisionKind,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub edited_quote: Option<QuoteBreakdown>,
    #[serde(default)]
    pub booked_date: Option<String>,
    #[serde(default)]
    pub booked_time_slot: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_never_moves_backward() {
        assert!(LeadStatus::New.can_transition(LeadStatus::DetailsCollected));
        assert!(LeadStatus::DetailsCollected.can_transition(LeadStatus::Pricing));
        assert!(!LeadStatus::TradieReview.can_transition(LeadStatus::Pricing));
        assert!(!LeadStatus::Booked.can_transition(LeadStatus::Confirmed));
    }

    #[test]
    fn edit_loop_is_the_only_self_transition() {
        assert!(LeadStatus::TradieReview.can_transition(LeadStatus::TradieReview));
        assert!(!LeadStatus::Pricing.can_transition(LeadStatus::Pricing));
        assert!(!LeadStatus::New.can_transition(LeadStatus::New));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        assert!(!LeadStatus::Rejected.can_transition(LeadStatus::New));
        assert!(!LeadStatus::Cancelled.can_transition(LeadStatus::Rejected));
        assert!(LeadStatus::TradieReview.can_transition(LeadStatus::Rejected));
        assert!(LeadStatus::New.can_transition(LeadStatus::Cancelled));
    }

    #[test]
    fn transition_on_lead_is_enforced() {
        let mut lead = LeadSession::new("biz-1");
        lead.transition(LeadStatus::DetailsCollected).unwrap();
        lead.transition(LeadStatus::TradieReview).unwrap();
        assert!(lead.transition(LeadStatus::New).is_err());
        assert_eq!(lead.status, LeadStatus::TradieReview);
    }

    #[test]
    fn display_quote_prefers_tradie_edit() {
        let mut lead = LeadSession::new("biz-1");
        let snapshot = QuoteBreakdown {
            line_items: vec![],
            subtotal: 100.0,
            gst: 10.0,
            total: 110.0,
            currency: "AUD".into(),
        };
        lead.quote_snapshot = Some(snapshot.clone());
        assert_eq!(lead.display_quote().unwrap().total, 110.0);

        let edited = QuoteBreakdown {
            total: 150.0,
            ..snapshot
        };
        lead.tradie_edited_quote = Some(edited);
        assert_eq!(lead.display_quote().unwrap().total, 150.0);
        // The original snapshot stays for audit.
        assert_eq!(lead.quote_snapshot.as_ref().unwrap().total, 110.0);
    }

    #[test]
    fn job_type_wire_names() {
        assert_eq!(JobType::PipeBurst.as_str(), "pipe_burst");
        assert_eq!(JobType::PipeBurst.display_name(), "pipe burst");
        let parsed: JobType = "blocked_drain".parse().unwrap();
        assert_eq!(parsed, JobType::BlockedDrain);
        assert!("arc_welding".parse::<JobType>().is_err());
    }
}
