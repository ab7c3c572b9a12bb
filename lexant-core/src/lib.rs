//! # Lexant Core
//!
//! Core library for the Lexant legal-research assistant.
//! Provides the answer pipeline: retrieval with pruning, citation
//! extraction and resolution, claim extraction, answer verification,
//! confidence gating, and guardrails, plus the provider abstraction,
//! embedding cache, configuration, and fundamental types.

pub mod citations;
pub mod claims;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod gate;
pub mod guardrails;
pub mod providers;
pub mod retrieval;
pub mod types;
pub mod verifier;

// Re-export commonly used types at the crate root.
pub use config::{AssistantConfig, load_config};
pub use engine::{AskRequest, AssistantEngine, is_exhaustive_request};
pub use error::{LexantError, LlmError, Result, SearchError};
pub use gate::{GateOutcome, gate};
pub use providers::{GenerativeProvider, MockProvider, create_provider};
pub use retrieval::{Retriever, SearchBackend, SearchOptions, SearchResponse};
pub use types::{
    Answer, Claim, ClaimKind, GuardrailReport, Source, SourceKind, SourceMode,
    VerificationReport, VerificationStatus,
};
pub use verifier::{Verifier, VerifierOutcome};
