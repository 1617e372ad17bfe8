//! Persistence and cache traits
//!
//! The relational mechanics live behind `LeadStore`; the pipeline only
//! depends on these operations and their invariants (quote line items
//! are written as one batch before a lead advances to review, leads are
//! never hard-deleted). `SnapshotCache` is strictly best-effort: its
//! total absence degrades to direct store reads with no behavioral
//! change.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::lead::{BusinessProfile, LeadSession, QuoteLineItem};

#[async_trait]
pub trait LeadStore: Send + Sync + 'static {
    async fn insert_lead(&self, lead: &LeadSession) -> Result<()>;

    async fn update_lead(&self, lead: &LeadSession) -> Result<()>;

    async fn get_lead(&self, id: &str) -> Result<Option<LeadSession>>;

    async fn list_leads(&self, business_id: &str) -> Result<Vec<LeadSession>>;

    /// Persist a quote's line items as a single batch. A reader must
    /// never observe a partially written quote. Line items are immutable
    /// once written: a repricing appends a new batch, it never edits or
    /// discards an earlier one.
    async fn insert_line_items(&self, items: &[QuoteLineItem]) -> Result<()>;

    /// The most recent batch for the lead, i.e. the current quote.
    async fn line_items(&self, lead_id: &str) -> Result<Vec<QuoteLineItem>>;

    /// Every batch ever written for the lead, oldest first.
    async fn line_item_batches(&self, lead_id: &str) -> Result<Vec<Vec<QuoteLineItem>>>;

    async fn get_business(&self, id: &str) -> Result<Option<BusinessProfile>>;

    async fn upsert_business(&self, profile: &BusinessProfile) -> Result<()>;
}

/// Best-effort key/value cache for hot snapshots and classification
/// results, keyed by content hash.
#[async_trait]
pub trait SnapshotCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Option<String>;

    async fn put(&self, key: &str, value: String, ttl: Duration);
}
