//! OpenAI-compatible provider.
//!
//! Calls the `chat/completions` endpoint; works against OpenAI, Azure, and
//! local OpenAI-compatible servers. Used as the fallback half of the
//! provider pair — it performs no grounding of its own.

use crate::error::LlmError;
use crate::providers::{Generation, GenerationRequest, GenerativeProvider, classify_status};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(model: &str, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.to_string(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system_instruction {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in &request.history {
            messages.push(json!({"role": "user", "content": turn.user}));
            messages.push(json!({"role": "assistant", "content": turn.assistant}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        })
    }

    fn parse_response(data: &Value) -> Result<Generation, LlmError> {
        let text = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No message content in completion response".into(),
            })?;

        Ok(Generation {
            text: text.to_string(),
            grounding_used: false,
        })
    }
}

#[async_trait]
impl GenerativeProvider for OpenAiCompatibleProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = self.model.as_str(), "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Request to completion API failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), "openai", &self.model));
        }

        let data: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON in completion response: {e}"),
        })?;

        Self::parse_response(&data)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
