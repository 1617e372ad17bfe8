//! OpenRouter-compatible chat completion client
//!
//! One HTTP request per `complete` call; retry-once-then-fall-back is the
//! classifier's job, so stacking backoff here would multiply its attempts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use leadline_core::{Error, LanguageModel, Result};

use crate::retry::{classify_reqwest, classify_status};

const PROVIDER: &str = "llm";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completion client against an OpenAI-compatible endpoint.
pub struct OpenRouterLlm {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenRouterLlm {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::permanent(PROVIDER, e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    async fn complete_once(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_text},
            ],
            "temperature": 0.1,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(PROVIDER, format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::permanent(PROVIDER, "response contained no choices"))
    }
}

#[async_trait]
impl LanguageModel for OpenRouterLlm {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        debug!(model = %self.model, chars = user_text.len(), "chat completion request");
        self.complete_once(system_prompt, user_text).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
