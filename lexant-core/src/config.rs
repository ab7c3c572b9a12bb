//! Configuration for the Lexant assistant.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Environment variables use the `LEXANT_` prefix with `__`
//! as the section separator (e.g. `LEXANT_LLM__MODEL`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub verification: VerificationConfig,
    pub cache: CacheConfig,
}

/// Configuration for the generative providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Primary provider name: "gemini" or "openai".
    pub provider: String,
    /// Model identifier for the primary provider.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Default temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Whether to request provider-side web grounding when available.
    #[serde(default)]
    pub enable_grounding: bool,
    /// Optional fallback provider tried once on capacity or
    /// model-not-found errors from the primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackProviderConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: "gemini-2.0-flash".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            base_url: None,
            temperature: 0.2,
            enable_grounding: false,
            fallback: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for the fallback generative provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackProviderConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Retry policy for transient provider and backend failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// Configuration for retrieval and pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum sources kept after pruning.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    /// Per-backend result limit for a normal request.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    /// Per-backend result limit in exhaustive mode.
    #[serde(default = "default_exhaustive_limit")]
    pub exhaustive_limit: usize,
    /// Jaccard similarity above which two sources are near-duplicates.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,
}

fn default_max_sources() -> usize {
    3
}
fn default_result_limit() -> usize {
    5
}
fn default_exhaustive_limit() -> usize {
    20
}
fn default_dedup_threshold() -> f64 {
    0.8
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_sources: 3,
            result_limit: 5,
            exhaustive_limit: 20,
            dedup_threshold: 0.8,
        }
    }
}

/// Thresholds for the confidence gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Minimum coverage to show an answer with generic evidence.
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f64,
    /// Lowered threshold when evidence includes verbatim bill text.
    #[serde(default = "default_bill_text_threshold")]
    pub bill_text_threshold: f64,
    /// Lowered threshold when evidence includes live web grounding.
    #[serde(default = "default_grounding_threshold")]
    pub grounding_threshold: f64,
}

fn default_base_threshold() -> f64 {
    0.6
}
fn default_bill_text_threshold() -> f64 {
    0.3
}
fn default_grounding_threshold() -> f64 {
    0.2
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.6,
            bill_text_threshold: 0.3,
            grounding_threshold: 0.2,
        }
    }
}

/// Configuration for the two-tier embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tier-1 in-process LRU capacity.
    #[serde(default = "default_lru_capacity")]
    pub lru_capacity: usize,
    /// Tier-2 entry time-to-live in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Path to the tier-2 sqlite store; tier 2 is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<std::path::PathBuf>,
}

fn default_lru_capacity() -> usize {
    100
}
fn default_ttl_secs() -> u64 {
    86_400
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lru_capacity: 100,
            ttl_secs: 86_400,
            store_path: None,
        }
    }
}

/// Load configuration with layered precedence:
/// built-in defaults, then the user config file, then an optional explicit
/// config file, then `LEXANT_`-prefixed environment variables.
pub fn load_config(
    config_file: Option<&Path>,
) -> Result<AssistantConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AssistantConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "lexant", "lexant") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (LEXANT_LLM__MODEL, LEXANT_RETRIEVAL__MAX_SOURCES, etc.)
    figment = figment.merge(Env::prefixed("LEXANT_").split("__"));

    figment.extract().map_err(Box::new)
}
