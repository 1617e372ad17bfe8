//! Outbound provider clients
//!
//! Concrete implementations of the provider traits: streaming STT, chunked
//! TTS, chat completion, the distance resolver chain and SMS. Every client
//! classifies its failures as transient or permanent so the shared retry
//! policy can decide what to do with them.

pub mod distance;
pub mod llm;
pub mod retry;
pub mod sms;
pub mod stt;
pub mod tts;

pub use distance::{GeocodeRouteProvider, MatrixProvider, ServiceAreaResolver, haversine_km};
pub use llm::OpenRouterLlm;
pub use retry::{RetryPolicy, with_retry};
pub use sms::{TwilioCredentials, TwilioSms, booking_confirmation_body, photo_request_body};
pub use stt::DeepgramStt;
pub use tts::ElevenLabsTts;
