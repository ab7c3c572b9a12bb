//! Google Gemini provider.
//!
//! Calls the `generateContent` endpoint. When grounding is requested the
//! `google_search` tool is attached and the response's grounding metadata
//! is surfaced to the caller via `Generation::grounding_used`.

use crate::error::LlmError;
use crate::providers::{Generation, GenerationRequest, GenerativeProvider, classify_status};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(model: &str, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.to_string(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Build the `generateContent` request body from history + prompt.
    fn build_request_body(&self, request: &GenerationRequest) -> Value {
        let mut contents = Vec::new();
        for turn in &request.history {
            contents.push(json!({
                "role": "user",
                "parts": [{"text": turn.user}],
            }));
            contents.push(json!({
                "role": "model",
                "parts": [{"text": turn.assistant}],
            }));
        }
        contents.push(json!({
            "role": "user",
            "parts": [{"text": request.prompt}],
        }));

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
            },
        });

        if let Some(ref system) = request.system_instruction {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if request.use_grounding {
            body["tools"] = json!([{"google_search": {}}]);
        }

        body
    }

    fn parse_response(data: &Value) -> Result<Generation, LlmError> {
        let candidate = &data["candidates"][0];
        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No content parts in Gemini response".into(),
            })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::ResponseParse {
                message: "Empty text in Gemini response".into(),
            });
        }

        let grounding_used = candidate["groundingMetadata"].is_object();

        Ok(Generation {
            text,
            grounding_used,
        })
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let body = self.build_request_body(request);
        let url = self.endpoint_url();

        debug!(model = self.model.as_str(), "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Request to Gemini API failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), "gemini", &self.model));
        }

        let data: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON in Gemini response: {e}"),
        })?;

        Self::parse_response(&data)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_grounding(&self) -> bool {
        true
    }
}
