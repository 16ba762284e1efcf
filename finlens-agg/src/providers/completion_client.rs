//! Chat-completions client (OpenAI-compatible `POST /chat/completions`)
//!
//! One call per `complete`; retries belong to the caller's resilient call
//! wrapper.

use async_trait::async_trait;
use governor::DefaultDirectRateLimiter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{build_http_client, build_rate_limiter, check_status, require_key, HttpSettings};
use crate::types::{
    ChatMessage, CompletionRequest, CompletionService, FetchError, GenerationHint, ReasoningEffort,
};

const PROVIDER: &str = "completion";

/// Generation runs far longer than data endpoints
const MIN_COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct CompletionClient {
    http_client: Client,
    rate_limiter: DefaultDirectRateLimiter,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self, FetchError> {
        let settings = HttpSettings {
            timeout: settings.timeout.max(MIN_COMPLETION_TIMEOUT),
            ..*settings
        };

        Ok(Self {
            http_client: build_http_client(&settings)?,
            rate_limiter: build_rate_limiter(&settings),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn request_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatRequestBody<'a> {
    let (temperature, reasoning_effort) = match request.hint {
        GenerationHint::Temperature(t) => (Some(t), None),
        GenerationHint::Effort(effort) => (None, Some(effort)),
    };

    ChatRequestBody {
        model,
        messages: &request.messages,
        temperature,
        reasoning_effort,
    }
}

fn first_content(body: ChatResponseBody) -> Result<String, FetchError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| FetchError::Parse("completion returned no content".to_string()))
}

#[async_trait]
impl CompletionService for CompletionClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, FetchError> {
        let api_key = require_key(PROVIDER, &self.api_key)?;
        self.rate_limiter.until_ready().await;

        debug!(model = %self.model, messages = request.messages.len(), "Requesting completion");
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request_body(&self.model, request))
            .send()
            .await?;
        let body: ChatResponseBody = check_status(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse completion response: {}", e)))?;

        first_content(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hint_selects_sampling_field() {
        let request = CompletionRequest {
            messages: vec![ChatMessage::user("hi")],
            hint: GenerationHint::Effort(ReasoningEffort::High),
            max_attempts: 3,
        };
        let body = serde_json::to_value(request_body("o3-mini", &request)).unwrap();
        assert_eq!(body["reasoning_effort"], "high");
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["role"], "user");

        let request = CompletionRequest {
            hint: GenerationHint::Temperature(0.5),
            ..request
        };
        let body = serde_json::to_value(request_body("gpt-4o-mini", &request)).unwrap();
        assert_eq!(body["temperature"], 0.5);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn test_first_content_extraction() {
        let body: ChatResponseBody = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"a\":1}" } }]
        }))
        .unwrap();
        assert_eq!(first_content(body).unwrap(), "{\"a\":1}");

        let empty: ChatResponseBody = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(first_content(empty), Err(FetchError::Parse(_))));
    }
}
