//! Lead lifecycle orchestration
//!
//! `LeadManager` owns the pipeline between a customer utterance and a
//! quote in review: classification, the service-area gate, the photo
//! offer, pricing, and the owner's decision afterwards. Provider failures
//! degrade (no distance, no SMS) rather than abort; the only hard errors
//! are unknown leads and illegal state transitions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use leadline_classifier::{Classification, Classifier};
use leadline_core::{
    BusinessProfile, Error, LeadEvent, LeadSession, LeadStatus, LeadStore, PipelineStep,
    QuoteLineItem, Result, SmsSender, SnapshotCache, TradieDecision, TradieDecisionKind, TurnRole,
    UrgencyLevel,
};
use leadline_providers::{booking_confirmation_body, photo_request_body, ServiceAreaResolver};
use leadline_quote::{calculate_quote, estimate_labour_hours, parts_cost_for_job, QuoteParams};

/// Result of processing one customer message.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub lead: LeadSession,
    /// Text to speak or send back to the customer.
    pub reply: String,
    pub events: Vec<LeadEvent>,
    /// True when the job is outside the service area and no quote was
    /// produced.
    pub declined: bool,
}

pub struct LeadManager {
    store: Arc<dyn LeadStore>,
    cache: Arc<dyn SnapshotCache>,
    classifier: Arc<Classifier>,
    distance: Arc<ServiceAreaResolver>,
    sms: Arc<dyn SmsSender>,
    link_base_url: String,
    classification_ttl: Duration,
}

impl LeadManager {
    pub fn new(
        store: Arc<dyn LeadStore>,
        cache: Arc<dyn SnapshotCache>,
        classifier: Arc<Classifier>,
        distance: Arc<ServiceAreaResolver>,
        sms: Arc<dyn SmsSender>,
        link_base_url: String,
        classification_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            classifier,
            distance,
            sms,
            link_base_url: link_base_url.trim_end_matches('/').to_string(),
            classification_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    /// Create a fresh lead for an inbound contact.
    pub async fn create_lead(
        &self,
        business_id: &str,
        customer_phone: &str,
        customer_name: &str,
    ) -> Result<(LeadSession, LeadEvent)> {
        let mut lead = LeadSession::new(business_id);
        lead.customer_phone = customer_phone.to_string();
        lead.customer_name = customer_name.to_string();
        self.store.insert_lead(&lead).await?;
        info!(lead_id = %lead.id, business_id, "lead created");
        let event = LeadEvent::LeadCreated {
            lead: Box::new(lead.clone()),
        };
        Ok((lead, event))
    }

    /// Classify an utterance, consulting the content-hash cache first.
    pub async fn classify_cached(&self, text: &str) -> Classification {
        let key = crate::cache::content_key("classify", text);
        if let Some(hit) = self.cache.get(&key).await {
            if let Ok(classification) = serde_json::from_str::<Classification>(&hit) {
                return classification;
            }
        }
        let classification = self.classifier.classify(text).await;
        if let Ok(json) = serde_json::to_string(&classification) {
            self.cache.put(&key, json, self.classification_ttl).await;
        }
        classification
    }

    /// Run the full intake pipeline for one customer message: classify,
    /// gate on service area, offer a photo upload, price, and park the
    /// lead in review.
    pub async fn process_customer_message(
        &self,
        lead_id: &str,
        text: &str,
    ) -> Result<ProcessOutcome> {
        let mut lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("lead {lead_id}")))?;
        if lead.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "lead {lead_id} is {:?} and no longer accepts messages",
                lead.status
            )));
        }

        let profile = self
            .store
            .get_business(&lead.business_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("business {}", lead.business_id)))?;

        lead.push_turn(TurnRole::Customer, text);
        let mut events = vec![step(lead_id, PipelineStep::Classifying, "Understanding the job")];

        let classification = self.classify_cached(text).await;
        apply_classification(&mut lead, &classification);
        if lead.status == LeadStatus::New {
            lead.transition(LeadStatus::DetailsCollected)?;
        }
        events.push(LeadEvent::LeadUpdate {
            lead_id: lead.id.clone(),
            status: lead.status,
            job_type: lead.job_type,
            urgency: Some(lead.urgency),
            address: Some(lead.customer_address.clone()),
            message: format!(
                "Classified as {}",
                lead.job_type.unwrap_or_default().display_name()
            ),
        });

        // Service-area gate. Runs before any pricing; an unresolvable
        // distance is not a decline, just a quote without a travel line.
        if !lead.customer_address.is_empty() && !profile.base_address.is_empty() {
            match self
                .distance
                .resolve(&profile.base_address, &lead.customer_address)
                .await
            {
                Ok(result) => {
                    lead.distance_km = Some(result.distance_km);
                    lead.travel_minutes = Some(result.duration_minutes);
                    events.push(step(
                        lead_id,
                        PipelineStep::DistanceCalculated,
                        format!("{:.1} km away", result.distance_km),
                    ));

                    if result.distance_km > profile.service_radius_km {
                        return self.decline_out_of_area(lead, &profile, events).await;
                    }
                }
                Err(err) => {
                    warn!(lead_id, error = %err, "distance unresolved, quoting without travel");
                }
            }
        }

        // Photo offer, only when we have a number to text and the lead has
        // not already passed this stage (follow-up messages re-price but
        // never re-send the link). The status advances regardless of the
        // SMS outcome; a send failure is logged, never retried.
        if !lead.customer_phone.is_empty() && lead.status.can_transition(LeadStatus::MediaPending) {
            let link = format!("{}/upload/{}", self.link_base_url, lead.id);
            let body = photo_request_body(&profile.business_name, &link);
            let outcome = self.sms.send(&lead.customer_phone, &body).await;
            if outcome.is_failure() {
                warn!(lead_id, "photo request SMS failed");
            }
            lead.transition(LeadStatus::MediaPending)?;
            events.push(step(lead_id, PipelineStep::PhotoOffer, "Photo upload offered"));
        }

        // Pricing. A lead already in review skips the intermediate status
        // and lands back in review with a recalculated quote.
        if lead.status.can_transition(LeadStatus::Pricing) {
            lead.transition(LeadStatus::Pricing)?;
        }
        events.push(step(lead_id, PipelineStep::Pricing, "Calculating the estimate"));

        let job_type = lead.job_type.unwrap_or_default();
        let params = QuoteParams::from_profile(
            &profile,
            estimate_labour_hours(job_type),
            parts_cost_for_job(job_type),
            lead.distance_km.unwrap_or(0.0),
        );
        let quote = calculate_quote(&params);

        let items: Vec<QuoteLineItem> = quote
            .line_items
            .iter()
            .map(|line| QuoteLineItem::from_line(&lead.id, line.clone()))
            .collect();
        self.store.insert_line_items(&items).await?;

        lead.quote_total = Some(quote.total);
        lead.quote_snapshot = Some(quote.clone());
        lead.transition(LeadStatus::TradieReview)?;

        events.push(LeadEvent::QuoteReady {
            lead_id: lead.id.clone(),
            status: lead.status,
            quote: quote.clone(),
            distance_km: lead.distance_km.unwrap_or(0.0),
            travel_minutes: lead.travel_minutes.unwrap_or(0),
        });

        let reply = acknowledgment(&profile, &lead, quote.total);
        lead.push_turn(TurnRole::Assistant, &reply);
        self.store.update_lead(&lead).await?;

        info!(lead_id, total = quote.total, "lead quoted and parked for review");
        Ok(ProcessOutcome {
            lead,
            reply,
            events,
            declined: false,
        })
    }

    async fn decline_out_of_area(
        &self,
        mut lead: LeadSession,
        profile: &BusinessProfile,
        mut events: Vec<LeadEvent>,
    ) -> Result<ProcessOutcome> {
        let reply = format!(
            "Sorry, it looks like {} is outside our service area of {:.0} km. \
             We won't be able to help with this one, but thanks for calling {}.",
            lead.customer_address, profile.service_radius_km, profile.business_name
        );
        lead.push_turn(TurnRole::Assistant, &reply);
        events.push(LeadEvent::LeadUpdate {
            lead_id: lead.id.clone(),
            status: lead.status,
            job_type: lead.job_type,
            urgency: Some(lead.urgency),
            address: Some(lead.customer_address.clone()),
            message: "Outside service area, no quote produced".into(),
        });
        self.store.update_lead(&lead).await?;
        info!(lead_id = %lead.id, km = ?lead.distance_km, "lead declined, out of area");
        Ok(ProcessOutcome {
            lead,
            reply,
            events,
            declined: true,
        })
    }

    /// Apply the owner's decision to a lead in review.
    pub async fn handle_decision(
        &self,
        business_id: &str,
        lead_id: &str,
        decision: TradieDecision,
    ) -> Result<(LeadSession, Vec<LeadEvent>)> {
        let mut lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("lead {lead_id}")))?;
        if lead.business_id != business_id {
            return Err(Error::Conflict(format!(
                "lead {lead_id} belongs to another business"
            )));
        }
        if lead.status != LeadStatus::TradieReview {
            return Err(Error::Conflict(format!(
                "lead {lead_id} is {:?}, decisions only apply in review",
                lead.status
            )));
        }

        let mut events = Vec::new();
        lead.tradie_decision = Some(decision.decision);
        lead.tradie_notes = decision.notes.clone();

        match decision.decision {
            TradieDecisionKind::Approve => {
                let booking = match (&decision.booked_date, &decision.booked_time_slot) {
                    (Some(date), Some(slot)) => Some((date.clone(), slot.clone())),
                    (None, None) => None,
                    _ => {
                        return Err(Error::Validation(
                            "booking requires both a date and a time slot".into(),
                        ))
                    }
                };

                lead.transition(LeadStatus::Confirmed)?;
                events.push(LeadEvent::LeadDecided {
                    lead_id: lead.id.clone(),
                    decision: TradieDecisionKind::Approve,
                    decided_by: business_id.to_string(),
                });

                if let Some((date, slot)) = booking {
                    lead.booked_date = Some(date.clone());
                    lead.booked_time_slot = Some(slot.clone());
                    lead.booked_at = Some(Utc::now());
                    lead.transition(LeadStatus::Booked)?;

                    if !lead.customer_phone.is_empty() {
                        let profile = self.store.get_business(business_id).await?;
                        let name = profile
                            .map(|p| p.business_name)
                            .unwrap_or_else(|| "your plumber".to_string());
                        let body = booking_confirmation_body(
                            &name,
                            &date,
                            &slot,
                            lead.quote_total.unwrap_or(0.0),
                        );
                        let outcome = self.sms.send(&lead.customer_phone, &body).await;
                        if outcome.is_failure() {
                            warn!(lead_id, "booking confirmation SMS failed");
                        }
                    }

                    events.push(LeadEvent::BookingConfirmed {
                        lead_id: lead.id.clone(),
                        status: lead.status,
                        booked_date: date,
                        booked_time_slot: slot,
                        quote_total: lead.quote_total,
                    });
                }
            }
            TradieDecisionKind::Edit => {
                let edited = decision.edited_quote.ok_or_else(|| {
                    Error::Validation("edit decision requires an edited quote".into())
                })?;
                lead.quote_total = Some(edited.total);
                lead.tradie_edited_quote = Some(edited.clone());
                // The edit loop is the one legal self-transition; the
                // customer is not notified until the owner approves.
                lead.transition(LeadStatus::TradieReview)?;
                events.push(LeadEvent::QuoteUpdated {
                    lead_id: lead.id.clone(),
                    quote: edited,
                    quote_total: lead.quote_total.unwrap_or(0.0),
                });
            }
            TradieDecisionKind::Reject => {
                lead.transition(LeadStatus::Rejected)?;
                events.push(LeadEvent::LeadRejected {
                    lead_id: lead.id.clone(),
                    notes: decision.notes,
                });
            }
        }

        self.store.update_lead(&lead).await?;
        info!(lead_id, decision = ?lead.tradie_decision, status = ?lead.status, "decision applied");
        Ok((lead, events))
    }

    /// Cancel a lead at the owner's request: the job fell through, the
    /// customer withdrew, or a booking was called off. Legal from any
    /// non-terminal status; the record is kept, never deleted.
    pub async fn cancel_lead(
        &self,
        business_id: &str,
        lead_id: &str,
        reason: Option<String>,
    ) -> Result<(LeadSession, Vec<LeadEvent>)> {
        let mut lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("lead {lead_id}")))?;
        if lead.business_id != business_id {
            return Err(Error::Conflict(format!(
                "lead {lead_id} belongs to another business"
            )));
        }

        lead.transition(LeadStatus::Cancelled)?;
        let message = match &reason {
            Some(reason) => format!("Cancelled: {reason}"),
            None => "Cancelled".to_string(),
        };
        lead.push_turn(TurnRole::System, &message);
        self.store.update_lead(&lead).await?;

        let events = vec![LeadEvent::LeadUpdate {
            lead_id: lead.id.clone(),
            status: lead.status,
            job_type: lead.job_type,
            urgency: None,
            address: None,
            message,
        }];
        info!(lead_id, "lead cancelled");
        Ok((lead, events))
    }
}

fn step(lead_id: &str, step: PipelineStep, message: impl Into<String>) -> LeadEvent {
    LeadEvent::StepChanged {
        lead_id: lead_id.to_string(),
        step,
        message: message.into(),
    }
}

/// Merge classification facts into the lead. Existing customer-provided
/// facts win over re-extraction; urgency only ever escalates.
fn apply_classification(lead: &mut LeadSession, classification: &Classification) {
    lead.job_type = Some(classification.job_type);
    if lead.job_description.is_empty() {
        lead.job_description = classification.description.clone();
    }
    if urgency_rank(classification.urgency) < urgency_rank(lead.urgency) {
        lead.urgency = classification.urgency;
    }
    if lead.customer_address.is_empty() && classification.address != "unknown" {
        lead.customer_address = classification.address.clone();
    }
}

fn urgency_rank(urgency: UrgencyLevel) -> u8 {
    match urgency {
        UrgencyLevel::Emergency => 0,
        UrgencyLevel::Today => 1,
        UrgencyLevel::Tomorrow => 2,
        UrgencyLevel::ThisWeek => 3,
        UrgencyLevel::Flexible => 4,
    }
}

fn urgency_phrase(urgency: UrgencyLevel) -> &'static str {
    match urgency {
        UrgencyLevel::Emergency => "we'll treat it as an emergency",
        UrgencyLevel::Today => "we'll aim for today",
        UrgencyLevel::Tomorrow => "we'll aim for tomorrow",
        UrgencyLevel::ThisWeek => "we'll fit it in this week",
        UrgencyLevel::Flexible => "we'll find a time that suits you",
    }
}

fn acknowledgment(profile: &BusinessProfile, lead: &LeadSession, total: f64) -> String {
    let mut reply = format!(
        "No worries, sounds like a {} and {}. Based on standard rates the \
         estimate comes to ${total:.2} including GST. {} will \
         review it and confirm with you shortly.",
        lead.job_type.unwrap_or_default().display_name(),
        urgency_phrase(lead.urgency),
        profile.business_name,
    );
    if let Some(slot) = profile.next_available_slots.first() {
        reply.push_str(&format!(" The earliest slot going is {slot}."));
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use leadline_core::{
        BusinessProfile, DistanceProvider, DistanceResult, LanguageModel, QuoteBreakdown,
        SmsOutcome,
    };
    use leadline_providers::TwilioSms;

    use crate::cache::MemoryCache;
    use crate::store::InMemoryLeadStore;

    struct FixedDistance(f64);

    #[async_trait]
    impl DistanceProvider for FixedDistance {
        async fn resolve(&self, origin: &str, destination: &str) -> Result<DistanceResult> {
            Ok(DistanceResult {
                distance_km: self.0,
                duration_minutes: (self.0 / 40.0 * 60.0).ceil() as u32,
                origin: origin.to_string(),
                destination: destination.to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Counts completions and always returns the same valid JSON.
    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for CountingModel {
        async fn complete(&self, _system_prompt: &str, _user_text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"job_type": "blocked_drain", "address": "unknown", "suburb": null, "urgency": "today", "description": "Drain blocked.", "parts_needed": []}"#.to_string())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct FailingSms;

    #[async_trait]
    impl SmsSender for FailingSms {
        async fn send(&self, _to: &str, _body: &str) -> SmsOutcome {
            SmsOutcome::Failed {
                error: "provider rejected the message".into(),
            }
        }
    }

    async fn manager_with_distance(km: f64) -> (LeadManager, Arc<InMemoryLeadStore>) {
        let store = Arc::new(InMemoryLeadStore::new());
        let mut profile = BusinessProfile::new("biz-1", "Reliable Plumbing");
        profile.base_address = "1 Depot St, Nerang".to_string();
        profile.next_available_slots = vec!["tomorrow between 8 and 10".to_string()];
        store.upsert_business(&profile).await.unwrap();

        let resolver = ServiceAreaResolver::new(vec![Arc::new(FixedDistance(km))]);
        let manager = LeadManager::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            Arc::new(Classifier::keyword_only()),
            Arc::new(resolver),
            Arc::new(TwilioSms::mock()),
            "http://localhost:3000".into(),
            Duration::from_secs(60),
        );
        (manager, store)
    }

    #[tokio::test]
    async fn happy_path_ends_in_review_with_a_quote() {
        let (manager, store) = manager_with_distance(10.0).await;
        let (lead, _) = manager
            .create_lead("biz-1", "+61400000000", "Sam")
            .await
            .unwrap();

        let outcome = manager
            .process_customer_message(
                &lead.id,
                "blocked drain at 12 Marine Parade in Southport, need it today",
            )
            .await
            .unwrap();

        assert!(!outcome.declined);
        assert_eq!(outcome.lead.status, LeadStatus::TradieReview);
        assert_eq!(outcome.lead.job_type, Some(leadline_core::JobType::BlockedDrain));
        assert_eq!(outcome.lead.distance_km, Some(10.0));

        let quote = outcome.lead.quote_snapshot.as_ref().unwrap();
        assert!(quote.total > 0.0);
        assert!(outcome.reply.contains(&format!("${:.2}", quote.total)));
        assert!(outcome.reply.contains("tomorrow between 8 and 10"));

        // Line items were written as one batch before review.
        let items = store.line_items(&lead.id).await.unwrap();
        assert_eq!(items.len(), quote.line_items.len());

        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, LeadEvent::QuoteReady { .. })));
    }

    #[tokio::test]
    async fn out_of_area_declines_before_pricing() {
        let (manager, store) = manager_with_distance(80.0).await;
        let (lead, _) = manager
            .create_lead("biz-1", "+61400000000", "Sam")
            .await
            .unwrap();

        let outcome = manager
            .process_customer_message(&lead.id, "burst pipe at 5 Smith St in Coolangatta")
            .await
            .unwrap();

        assert!(outcome.declined);
        assert_eq!(outcome.lead.status, LeadStatus::DetailsCollected);
        assert!(outcome.lead.quote_snapshot.is_none());
        assert!(outcome.reply.contains("outside our service area"));
        assert!(store.line_items(&lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_phone_skips_the_photo_stage() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();

        let outcome = manager
            .process_customer_message(&lead.id, "leaking tap in Robina")
            .await
            .unwrap();

        assert_eq!(outcome.lead.status, LeadStatus::TradieReview);
        assert!(!outcome
            .events
            .iter()
            .any(|e| matches!(e, LeadEvent::StepChanged { step: PipelineStep::PhotoOffer, .. })));
    }

    #[tokio::test]
    async fn follow_up_messages_reprice_in_place() {
        let (manager, store) = manager_with_distance(10.0).await;
        let (lead, _) = manager
            .create_lead("biz-1", "+61400000000", "Sam")
            .await
            .unwrap();

        let first = manager
            .process_customer_message(&lead.id, "dripping tap in Robina")
            .await
            .unwrap();
        assert_eq!(first.lead.status, LeadStatus::TradieReview);

        let second = manager
            .process_customer_message(&lead.id, "actually the whole hot water system is dead")
            .await
            .unwrap();
        assert_eq!(second.lead.status, LeadStatus::TradieReview);
        assert_eq!(
            second.lead.job_type,
            Some(leadline_core::JobType::HotWaterRepair)
        );
        // Repricing happened, but the photo link is not sent twice.
        assert_ne!(first.lead.quote_total, second.lead.quote_total);
        assert!(!second
            .events
            .iter()
            .any(|e| matches!(e, LeadEvent::StepChanged { step: PipelineStep::PhotoOffer, .. })));

        // Both quotes' line items survive; the latest batch is current.
        let batches = store.line_item_batches(&lead.id).await.unwrap();
        assert_eq!(batches.len(), 2);
        let current = store.line_items(&lead.id).await.unwrap();
        assert_eq!(
            current.len(),
            second.lead.quote_snapshot.as_ref().unwrap().line_items.len()
        );
    }

    #[tokio::test]
    async fn approve_with_booking_books_and_notifies() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager
            .create_lead("biz-1", "+61400000000", "Sam")
            .await
            .unwrap();
        manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();

        let (updated, events) = manager
            .handle_decision(
                "biz-1",
                &lead.id,
                TradieDecision {
                    decision: TradieDecisionKind::Approve,
                    notes: None,
                    edited_quote: None,
                    booked_date: Some("2026-09-01".into()),
                    booked_time_slot: Some("8:00-10:00".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, LeadStatus::Booked);
        assert!(updated.booked_at.is_some());
        assert!(events
            .iter()
            .any(|e| matches!(e, LeadEvent::BookingConfirmed { .. })));
    }

    #[tokio::test]
    async fn approve_with_half_a_booking_is_rejected() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();
        manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();

        let result = manager
            .handle_decision(
                "biz-1",
                &lead.id,
                TradieDecision {
                    decision: TradieDecisionKind::Approve,
                    notes: None,
                    edited_quote: None,
                    booked_date: Some("2026-09-01".into()),
                    booked_time_slot: None,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn edit_keeps_the_lead_in_review_with_both_quotes() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();
        let outcome = manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();
        let original_total = outcome.lead.quote_total.unwrap();

        let edited = QuoteBreakdown {
            line_items: vec![],
            subtotal: 400.0,
            gst: 40.0,
            total: 440.0,
            currency: "AUD".into(),
        };
        let (updated, events) = manager
            .handle_decision(
                "biz-1",
                &lead.id,
                TradieDecision {
                    decision: TradieDecisionKind::Edit,
                    notes: Some("needs a camera inspection".into()),
                    edited_quote: Some(edited),
                    booked_date: None,
                    booked_time_slot: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, LeadStatus::TradieReview);
        assert_eq!(updated.quote_total, Some(440.0));
        assert_eq!(updated.quote_snapshot.unwrap().total, original_total);
        assert!(events
            .iter()
            .any(|e| matches!(e, LeadEvent::QuoteUpdated { .. })));
    }

    #[tokio::test]
    async fn decisions_are_scoped_to_the_owning_business() {
        let (manager, store) = manager_with_distance(10.0).await;
        store
            .upsert_business(&BusinessProfile::new("biz-2", "Other Plumbing"))
            .await
            .unwrap();
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();
        manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();

        let result = manager
            .handle_decision(
                "biz-2",
                &lead.id,
                TradieDecision {
                    decision: TradieDecisionKind::Reject,
                    notes: None,
                    edited_quote: None,
                    booked_date: None,
                    booked_time_slot: None,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn decisions_require_review_status() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();

        let result = manager
            .handle_decision(
                "biz-1",
                &lead.id,
                TradieDecision {
                    decision: TradieDecisionKind::Reject,
                    notes: None,
                    edited_quote: None,
                    booked_date: None,
                    booked_time_slot: None,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn classification_results_are_cached_by_content() {
        let model = Arc::new(CountingModel::default());
        let store = Arc::new(InMemoryLeadStore::new());
        let manager = LeadManager::new(
            store,
            Arc::new(MemoryCache::new()),
            Arc::new(Classifier::new(Some(model.clone()))),
            Arc::new(ServiceAreaResolver::new(vec![Arc::new(FixedDistance(10.0))])),
            Arc::new(TwilioSms::mock()),
            "http://localhost:3000".into(),
            Duration::from_secs(60),
        );

        let first = manager.classify_cached("Blocked Drain in Southport").await;
        let second = manager.classify_cached("blocked drain in southport").await;
        assert_eq!(first, second);
        // The second call is served from the cache, not the model.
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn photo_sms_failure_still_advances_the_lead() {
        let store = Arc::new(InMemoryLeadStore::new());
        store
            .upsert_business(&BusinessProfile::new("biz-1", "Reliable Plumbing"))
            .await
            .unwrap();
        let manager = LeadManager::new(
            store,
            Arc::new(MemoryCache::new()),
            Arc::new(Classifier::keyword_only()),
            Arc::new(ServiceAreaResolver::new(vec![Arc::new(FixedDistance(10.0))])),
            Arc::new(FailingSms),
            "http://localhost:3000".into(),
            Duration::from_secs(60),
        );

        let (lead, _) = manager
            .create_lead("biz-1", "+61400000000", "Sam")
            .await
            .unwrap();
        let outcome = manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();

        // The send failed, but the lead still passed MEDIA_PENDING on the
        // way to review.
        assert_eq!(outcome.lead.status, LeadStatus::TradieReview);
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, LeadEvent::StepChanged { step: PipelineStep::PhotoOffer, .. })));
    }

    #[tokio::test]
    async fn cancellation_is_terminal_from_any_active_status() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager
            .create_lead("biz-1", "+61400000000", "Sam")
            .await
            .unwrap();
        manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();

        let (cancelled, events) = manager
            .cancel_lead("biz-1", &lead.id, Some("customer found someone else".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, LeadStatus::Cancelled);
        assert!(events
            .iter()
            .any(|e| matches!(e, LeadEvent::LeadUpdate { status: LeadStatus::Cancelled, .. })));

        // Terminal: no further messages, no second cancellation.
        assert!(matches!(
            manager.process_customer_message(&lead.id, "hello?").await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            manager.cancel_lead("biz-1", &lead.id, None).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_is_scoped_to_the_owning_business() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();
        assert!(matches!(
            manager.cancel_lead("biz-2", &lead.id, None).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn terminal_leads_reject_further_messages() {
        let (manager, _) = manager_with_distance(10.0).await;
        let (lead, _) = manager.create_lead("biz-1", "", "").await.unwrap();
        manager
            .process_customer_message(&lead.id, "blocked drain in Southport")
            .await
            .unwrap();
        manager
            .handle_decision(
                "biz-1",
                &lead.id,
                TradieDecision {
                    decision: TradieDecisionKind::Reject,
                    notes: None,
                    edited_quote: None,
                    booked_date: None,
                    booked_time_slot: None,
                },
            )
            .await
            .unwrap();

        let result = manager
            .process_customer_message(&lead.id, "actually can you come tomorrow")
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
