//! Lead lifecycle orchestration
//!
//! Ties classification, the service-area gate, the quote engine and the
//! owner's review decisions together behind [`LeadManager`], with an
//! in-memory store and a best-effort TTL cache for single-node use.

pub mod cache;
pub mod manager;
pub mod store;

pub use cache::{content_key, MemoryCache, NoopCache};
pub use manager::{LeadManager, ProcessOutcome};
pub use store::InMemoryLeadStore;
