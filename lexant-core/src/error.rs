//! Error types for the Lexant core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the generative-model, retrieval, embedding, and configuration
//! domains. Cancellation is a distinguished variant in each domain so that
//! a superseded request is never rendered as a user-facing failure.

use std::path::PathBuf;

/// Top-level error type for the Lexant core library.
#[derive(Debug, thiserror::Error)]
pub enum LexantError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Embedding error: {0}")]
    Embed(#[from] EmbedError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LexantError {
    /// Whether this error means the request was superseded rather than failed.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            LexantError::Llm(LlmError::Cancelled)
                | LexantError::Search(SearchError::Cancelled)
                | LexantError::Embed(EmbedError::Cancelled)
        )
    }
}

/// Errors from generative-provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider overloaded: {message}")]
    Overloaded { message: String },

    #[error("Quota exhausted for provider {provider}")]
    QuotaExhausted { provider: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Request was cancelled")]
    Cancelled,
}

impl LlmError {
    /// Capacity-class errors: rate limits, overload, quota. These (plus
    /// `ModelNotFound`) are the only errors that justify a fallback provider.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Overloaded { .. }
                | LlmError::QuotaExhausted { .. }
        )
    }

    /// Whether the primary's failure should be retried against the fallback
    /// provider. Auth and validation failures never fall back.
    pub fn triggers_fallback(&self) -> bool {
        self.is_capacity() || matches!(self, LlmError::ModelNotFound { .. })
    }

    /// Transient errors worth retrying against the same provider.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Overloaded { .. }
                | LlmError::Connection { .. }
                | LlmError::Timeout { .. }
        )
    }
}

/// Errors from retrieval backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Network-level failure (DNS, connect, body read).
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// 5xx from the backend — transient, retryable.
    #[error("Upstream failure: HTTP {status}")]
    Upstream { status: u16 },

    /// 4xx from the backend — permanent, not retried.
    #[error("Client error: HTTP {status}")]
    Client { status: u16 },

    #[error("Search was cancelled")]
    Cancelled,
}

impl SearchError {
    /// Transport and upstream failures are retried with backoff;
    /// client errors and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Transport { .. } | SearchError::Upstream { .. }
        )
    }
}

/// Errors from embedding generation. Distinct from cancellation so the
/// caller can tell a dead embedding path from a superseded request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    #[error("Embedding generation failed: {message}")]
    Failed { message: String },

    #[error("Embedding was cancelled")]
    Cancelled,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `LexantError`.
pub type Result<T> = std::result::Result<T, LexantError>;
