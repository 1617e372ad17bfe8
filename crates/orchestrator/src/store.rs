//! In-memory lead store
//!
//! Reference `LeadStore` implementation used by tests and single-node
//! deployments. Line items for one quote are written under a single lock
//! acquisition, so a reader never observes a partial batch; repricing
//! appends a new batch and leaves the earlier ones untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use leadline_core::{
    BusinessProfile, Error, LeadSession, LeadStore, QuoteLineItem, Result,
};

#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<String, LeadSession>>,
    line_items: RwLock<HashMap<String, Vec<Vec<QuoteLineItem>>>>,
    businesses: RwLock<HashMap<String, BusinessProfile>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn insert_lead(&self, lead: &LeadSession) -> Result<()> {
        let mut leads = self.leads.write();
        if leads.contains_key(&lead.id) {
            return Err(Error::Conflict(format!("lead {} already exists", lead.id)));
        }
        leads.insert(lead.id.clone(), lead.clone());
        Ok(())
    }

    async fn update_lead(&self, lead: &LeadSession) -> Result<()> {
        let mut leads = self.leads.write();
        if !leads.contains_key(&lead.id) {
            return Err(Error::NotFound(format!("lead {}", lead.id)));
        }
        leads.insert(lead.id.clone(), lead.clone());
        Ok(())
    }

    async fn get_lead(&self, id: &str) -> Result<Option<LeadSession>> {
        Ok(self.leads.read().get(id).cloned())
    }

    async fn list_leads(&self, business_id: &str) -> Result<Vec<LeadSession>> {
        let mut leads: Vec<_> = self
            .leads
            .read()
            .values()
            .filter(|l| l.business_id == business_id)
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn insert_line_items(&self, items: &[QuoteLineItem]) -> Result<()> {
        let Some(first) = items.first() else {
            return Ok(());
        };
        if items.iter().any(|i| i.lead_id != first.lead_id) {
            return Err(Error::Validation(
                "line item batch spans multiple leads".into(),
            ));
        }
        self.line_items
            .write()
            .entry(first.lead_id.clone())
            .or_default()
            .push(items.to_vec());
        Ok(())
    }

    async fn line_items(&self, lead_id: &str) -> Result<Vec<QuoteLineItem>> {
        Ok(self
            .line_items
            .read()
            .get(lead_id)
            .and_then(|batches| batches.last())
            .cloned()
            .unwrap_or_default())
    }

    async fn line_item_batches(&self, lead_id: &str) -> Result<Vec<Vec<QuoteLineItem>>> {
        Ok(self
            .line_items
            .read()
            .get(lead_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_business(&self, id: &str) -> Result<Option<BusinessProfile>> {
        Ok(self.businesses.read().get(id).cloned())
    }

    async fn upsert_business(&self, profile: &BusinessProfile) -> Result<()> {
        self.businesses
            .write()
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadline_core::{LineCategory, QuoteLine};

    fn line(lead_id: &str) -> QuoteLineItem {
        QuoteLineItem::from_line(
            lead_id,
            QuoteLine {
                category: LineCategory::Callout,
                label: "Call-out Fee".into(),
                quantity: 1.0,
                unit_price: 80.0,
                total: 80.0,
                notes: None,
            },
        )
    }

    #[tokio::test]
    async fn insert_is_create_only() {
        let store = InMemoryLeadStore::new();
        let lead = LeadSession::new("biz-1");
        store.insert_lead(&lead).await.unwrap();
        assert!(store.insert_lead(&lead).await.is_err());
        assert!(store.get_lead(&lead.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_requires_existing_lead() {
        let store = InMemoryLeadStore::new();
        let lead = LeadSession::new("biz-1");
        assert!(store.update_lead(&lead).await.is_err());
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_business() {
        let store = InMemoryLeadStore::new();
        store.insert_lead(&LeadSession::new("biz-1")).await.unwrap();
        store.insert_lead(&LeadSession::new("biz-1")).await.unwrap();
        store.insert_lead(&LeadSession::new("biz-2")).await.unwrap();
        assert_eq!(store.list_leads("biz-1").await.unwrap().len(), 2);
        assert_eq!(store.list_leads("biz-3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn line_item_batch_must_share_one_lead() {
        let store = InMemoryLeadStore::new();
        let mixed = vec![line("lead-a"), line("lead-b")];
        assert!(store.insert_line_items(&mixed).await.is_err());

        let batch = vec![line("lead-a"), line("lead-a")];
        store.insert_line_items(&batch).await.unwrap();
        assert_eq!(store.line_items("lead-a").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn repricing_appends_a_batch_without_touching_the_old_one() {
        let store = InMemoryLeadStore::new();
        let original = vec![line("lead-a"), line("lead-a")];
        store.insert_line_items(&original).await.unwrap();
        let repriced = vec![line("lead-a")];
        store.insert_line_items(&repriced).await.unwrap();

        // The current quote is the latest batch.
        let current = store.line_items("lead-a").await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, repriced[0].id);

        // The original batch survives for audit.
        let batches = store.line_item_batches("lead-a").await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].id, original[0].id);
    }
}
