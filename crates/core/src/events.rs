//! Lead lifecycle events fanned out to connected owner clients
//!
//! A closed set of tagged variants with a `kind` discriminant, so the
//! broadcast consumer side gets exhaustiveness checking instead of
//! untyped key/value maps. Clients only ever see coarse status here,
//! never internal provider error detail.

use serde::{Deserialize, Serialize};

use crate::lead::{
    JobType, LeadSession, LeadStatus, QuoteBreakdown, TradieDecisionKind, UrgencyLevel,
};

/// Coarse progress steps reported while a lead moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Classifying,
    PhotoOffer,
    Pricing,
    DistanceCalculated,
    AnalysingPhoto,
    AnalysisFailed,
}

/// Events delivered to every connected client of a business owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeadEvent {
    LeadCreated {
        lead: Box<LeadSession>,
    },
    StepChanged {
        lead_id: String,
        step: PipelineStep,
        message: String,
    },
    LeadUpdate {
        lead_id: String,
        status: LeadStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        job_type: Option<JobType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        urgency: Option<UrgencyLevel>,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        message: String,
    },
    QuoteReady {
        lead_id: String,
        status: LeadStatus,
        quote: QuoteBreakdown,
        distance_km: f64,
        travel_minutes: u32,
    },
    QuoteUpdated {
        lead_id: String,
        quote: QuoteBreakdown,
        quote_total: f64,
    },
    BookingConfirmed {
        lead_id: String,
        status: LeadStatus,
        booked_date: String,
        booked_time_slot: String,
        quote_total: Option<f64>,
    },
    LeadRejected {
        lead_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    LeadDecided {
        lead_id: String,
        decision: TradieDecisionKind,
        decided_by: String,
    },
}

impl LeadEvent {
    /// The lead this event concerns.
    pub fn lead_id(&self) -> &str {
        match self {
            Self::LeadCreated { lead } => &lead.id,
            Self::StepChanged { lead_id, .. }
            | Self::LeadUpdate { lead_id, .. }
            | Self::QuoteReady { lead_id, .. }
            | Self::QuoteUpdated { lead_id, .. }
            | Self::BookingConfirmed { lead_id, .. }
            | Self::LeadRejected { lead_id, .. }
            | Self::LeadDecided { lead_id, .. } => lead_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_kind_discriminant() {
        let event = LeadEvent::LeadRejected {
            lead_id: "lead-1".into(),
            notes: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "lead_rejected");
        assert_eq!(json["lead_id"], "lead-1");
    }

    #[test]
    fn step_changed_round_trips() {
        let event = LeadEvent::StepChanged {
            lead_id: "lead-2".into(),
            step: PipelineStep::Pricing,
            message: "Calculating your estimate...".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: LeadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lead_id(), "lead-2");
    }
}
