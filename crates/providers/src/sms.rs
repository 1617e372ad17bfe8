//! Twilio-style SMS sender
//!
//! Sending is infallible by contract: without credentials the message is
//! logged and reported as `MockSent`, and provider failures come back as
//! an outcome value. A lost SMS must never take down a call or a lead.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use leadline_core::{SmsOutcome, SmsSender};

#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

pub struct TwilioSms {
    client: reqwest::Client,
    credentials: Option<TwilioCredentials>,
}

#[derive(Deserialize)]
struct TwilioResponse {
    sid: String,
}

impl TwilioSms {
    pub fn new(client: reqwest::Client, credentials: Option<TwilioCredentials>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Mock-only sender for tests and keyless deployments.
    pub fn mock() -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials: None,
        }
    }
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> SmsOutcome {
        let Some(creds) = &self.credentials else {
            info!(to, body, "SMS not configured, mock send");
            return SmsOutcome::MockSent;
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            creds.account_sid
        );
        let result = self
            .client
            .post(url)
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .form(&[("To", to), ("From", &creds.from_number), ("Body", body)])
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(to, error = %e, "SMS send failed");
                return SmsOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(to, %status, "SMS rejected by provider");
            return SmsOutcome::Failed {
                error: format!("HTTP {status}: {text}"),
            };
        }

        match response.json::<TwilioResponse>().await {
            Ok(parsed) => {
                info!(to, id = %parsed.sid, "SMS sent");
                SmsOutcome::Sent { id: parsed.sid }
            }
            Err(e) => SmsOutcome::Failed {
                error: format!("malformed provider response: {e}"),
            },
        }
    }
}

/// Photo-request message sent right after details are collected.
pub fn photo_request_body(business_name: &str, upload_link: &str) -> String {
    format!(
        "Thanks for calling {business_name}! A photo of the problem helps us \
         quote accurately. Upload one here: {upload_link}"
    )
}

/// Booking confirmation sent once the owner books the job.
pub fn booking_confirmation_body(
    business_name: &str,
    date: &str,
    time_slot: &str,
    total: f64,
) -> String {
    format!(
        "{business_name} has confirmed your booking for {date}, {time_slot}. \
         Quoted total: ${total:.2} inc. GST. Reply to this message if you need \
         to change anything."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_sender_mocks() {
        let sms = TwilioSms::mock();
        let outcome = sms.send("+61400000000", "hello").await;
        assert_eq!(outcome, SmsOutcome::MockSent);
        assert!(!outcome.is_failure());
    }

    #[test]
    fn message_bodies_carry_the_facts() {
        let photo = photo_request_body("Reliable Plumbing", "http://example.test/u/abc");
        assert!(photo.contains("Reliable Plumbing"));
        assert!(photo.contains("http://example.test/u/abc"));

        let booking =
            booking_confirmation_body("Reliable Plumbing", "2026-09-01", "8:00-10:00", 310.2);
        assert!(booking.contains("2026-09-01"));
        assert!(booking.contains("8:00-10:00"));
        assert!(booking.contains("$310.20"));
    }
}
