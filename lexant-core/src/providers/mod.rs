//! Generative provider implementations.
//!
//! Provides concrete implementations of the `GenerativeProvider` trait for:
//! - Google Gemini API (primary, supports web grounding)
//! - OpenAI-compatible APIs (fallback)
//!
//! Use `create_provider()` to instantiate the configured provider pair.

pub mod fallback;
pub mod gemini;
pub mod openai_compat;

use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use fallback::FallbackProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// One prior exchange in the conversation, passed to the provider as history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTurn {
    pub user: String,
    pub assistant: String,
}

/// A request to a generative provider.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub history: Vec<HistoryTurn>,
    pub temperature: f32,
    /// Ask the provider to ground the response with its own web search.
    pub use_grounding: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.2,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    pub fn with_grounding(mut self, use_grounding: bool) -> Self {
        self.use_grounding = use_grounding;
        self
    }
}

/// The result of a generative call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// Whether the provider performed live web grounding for this response.
    pub grounding_used: bool,
}

/// Trait for generative providers.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Perform a completion and return the generated text.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Whether this provider can perform its own web grounding.
    fn supports_grounding(&self) -> bool {
        false
    }
}

/// Map an HTTP status from a provider API to the error taxonomy.
pub(crate) fn classify_status(status: u16, provider: &str, model: &str) -> LlmError {
    match status {
        429 => LlmError::RateLimited {
            retry_after_secs: 5,
        },
        503 | 529 => LlmError::Overloaded {
            message: format!("HTTP {status} from {provider}"),
        },
        404 => LlmError::ModelNotFound {
            model: model.to_string(),
        },
        401 | 403 => LlmError::AuthFailed {
            provider: provider.to_string(),
        },
        400..=499 => LlmError::InvalidRequest {
            message: format!("HTTP {status} from {provider}"),
        },
        _ => LlmError::Connection {
            message: format!("HTTP {status} from {provider}"),
        },
    }
}

/// Execute an async operation with exponential backoff retry on transient
/// errors, aborting immediately if the cancellation token fires.
///
/// Retries on `RateLimited` (respects `retry_after_secs`), `Overloaded`,
/// `Connection`, and `Timeout`. Permanent errors (auth, validation, parse)
/// and cancellation return immediately.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_retryable() || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LlmError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Compute backoff delay, respecting rate-limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    let doubled = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(20));
    let computed = doubled.min(config.max_backoff_ms);
    if let LlmError::RateLimited { retry_after_secs } = err {
        return computed.max(retry_after_secs * 1000);
    }
    computed
}

/// Resolve a provider API key from the configured environment variable.
pub fn resolve_api_key(api_key_env: &str) -> Result<String, LlmError> {
    std::env::var(api_key_env).map_err(|_| LlmError::AuthFailed {
        provider: format!("env var '{api_key_env}' not set"),
    })
}

fn create_single_provider(
    provider: &str,
    model: &str,
    api_key: String,
    base_url: Option<String>,
) -> Arc<dyn GenerativeProvider> {
    match provider {
        "gemini" => Arc::new(GeminiProvider::new(model, api_key, base_url)),
        _ => Arc::new(OpenAiCompatibleProvider::new(model, api_key, base_url)),
    }
}

/// Create the configured generative provider.
///
/// If a fallback provider is configured, wraps the pair in a
/// `FallbackProvider` that retries once against the fallback on
/// capacity-class (rate limit, overload, quota) or model-not-found errors.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn GenerativeProvider>, LlmError> {
    let api_key = resolve_api_key(&config.api_key_env)?;
    let primary = create_single_provider(
        &config.provider,
        &config.model,
        api_key,
        config.base_url.clone(),
    );

    let Some(ref fb) = config.fallback else {
        return Ok(primary);
    };

    match resolve_api_key(&fb.api_key_env) {
        Ok(key) => {
            let fallback =
                create_single_provider(&fb.provider, &fb.model, key, fb.base_url.clone());
            Ok(Arc::new(FallbackProvider::new(primary, fallback)))
        }
        Err(e) => {
            tracing::warn!(
                provider = %fb.provider,
                model = %fb.model,
                error = %e,
                "Skipping fallback provider that failed to initialize"
            );
            Ok(primary)
        }
    }
}

/// A mock generative provider for testing and development.
pub struct MockProvider {
    model: String,
    responses: std::sync::Mutex<Vec<Result<Generation, LlmError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a MockProvider that always returns the given text.
    pub fn with_text(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_text(text);
        }
        provider
    }

    /// Queue a text response to be returned by the next `generate` call.
    pub fn queue_text(&self, text: &str) {
        self.responses.lock().unwrap().push(Ok(Generation {
            text: text.to_string(),
            grounding_used: false,
        }));
    }

    /// Queue an error to be returned by the next `generate` call.
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeProvider for MockProvider {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, LlmError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Generation {
                text: "Mock response with no queued output.".into(),
                grounding_used: false,
            })
        } else {
            responses.remove(0)
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_capacity() {
        assert!(classify_status(429, "gemini", "m").is_capacity());
        assert!(classify_status(503, "gemini", "m").is_capacity());
        assert!(classify_status(529, "anthropic", "m").is_capacity());
    }

    #[test]
    fn test_classify_status_model_not_found() {
        match classify_status(404, "gemini", "gemini-x") {
            LlmError::ModelNotFound { model } => assert_eq!(model, "gemini-x"),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_auth_and_client() {
        assert!(matches!(
            classify_status(401, "gemini", "m"),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_status(403, "gemini", "m"),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_status(400, "gemini", "m"),
            LlmError::InvalidRequest { .. }
        ));
        assert!(matches!(
            classify_status(500, "gemini", "m"),
            LlmError::Connection { .. }
        ));
    }

    #[test]
    fn test_compute_backoff_doubles() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        };
        let err = LlmError::Connection {
            message: "reset".into(),
        };
        assert_eq!(compute_backoff(&config, 0, &err), 500);
        assert_eq!(compute_backoff(&config, 1, &err), 1_000);
        assert_eq!(compute_backoff(&config, 2, &err), 2_000);
    }

    #[test]
    fn test_compute_backoff_respects_cap_and_retry_after() {
        let config = RetryConfig {
            max_retries: 6,
            initial_backoff_ms: 500,
            max_backoff_ms: 2_000,
        };
        let conn = LlmError::Connection {
            message: "reset".into(),
        };
        assert_eq!(compute_backoff(&config, 5, &conn), 2_000); // capped

        let limited = LlmError::RateLimited {
            retry_after_secs: 10,
        };
        assert_eq!(compute_backoff(&config, 0, &limited), 10_000); // server wins
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        let result = with_retry(&config, &cancel, || async { Ok::<_, LlmError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_no_retry() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let cc = call_count.clone();
        let result = with_retry(&config, &cancel, || {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err::<i32, _>(LlmError::AuthFailed {
                    provider: "test".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let config = RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let cancel = CancellationToken::new();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let cc = call_count.clone();
        let result = with_retry(&config, &cancel, || {
            let cc = cc.clone();
            async move {
                let n = cc.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    Err(LlmError::Connection {
                        message: "blip".into(),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_cancelled_token_short_circuits() {
        let config = RetryConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = with_retry(&config, &cancel, || async { Ok::<_, LlmError>(1) }).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[tokio::test]
    async fn test_mock_provider_queued_responses() {
        let provider = MockProvider::new();
        provider.queue_text("first");
        provider.queue_text("second");

        let request = GenerationRequest::new("q");
        assert_eq!(provider.generate(&request).await.unwrap().text, "first");
        assert_eq!(provider.generate(&request).await.unwrap().text, "second");
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn test_create_provider_missing_key() {
        // SAFETY: test-only env mutation, no concurrent readers of this var.
        unsafe { std::env::remove_var("LEXANT_NONEXISTENT_KEY") };
        let config = LlmConfig {
            api_key_env: "LEXANT_NONEXISTENT_KEY".into(),
            ..Default::default()
        };
        let result = create_provider(&config);
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }

    #[test]
    fn test_create_provider_with_key() {
        unsafe { std::env::set_var("LEXANT_TEST_API_KEY", "test-key-123") };
        let config = LlmConfig {
            api_key_env: "LEXANT_TEST_API_KEY".into(),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gemini-2.0-flash");
        unsafe { std::env::remove_var("LEXANT_TEST_API_KEY") };
    }
}
