//! Language-model completion trait
//!
//! The model is treated as unreliable: it may 5xx, return malformed JSON,
//! or be unconfigured entirely. Callers own retry and fallback policy.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// One completion call. Returns the raw assistant text; the caller is
    /// responsible for parsing it against its contract.
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}
