//! SMS sender trait
//!
//! Sending never raises: failures come back as an outcome value, are
//! logged by the caller, and are never fatal to a call or a lead.

use async_trait::async_trait;

/// Result of an SMS send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsOutcome {
    /// Delivered to the provider; `id` is the provider message id.
    Sent { id: String },
    /// No credentials configured; the message was logged instead.
    MockSent,
    Failed { error: String },
}

impl SmsOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[async_trait]
pub trait SmsSender: Send + Sync + 'static {
    /// Send a message. Infallible by contract; see `SmsOutcome`.
    async fn send(&self, to: &str, body: &str) -> SmsOutcome;
}
