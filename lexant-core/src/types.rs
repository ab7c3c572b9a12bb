//! Core type definitions for the Lexant pipeline.
//!
//! Defines the fundamental data structures flowing through one answer
//! cycle: retrieved sources, extracted claims, verification reports,
//! guardrail results, and the final answer object. All of these are
//! created fresh per user turn and discarded once the answer is returned.

use serde::{Deserialize, Serialize};

/// Discriminates curated evidence from open-retrieval evidence.
///
/// Authoritative sources come from a pre-vetted corpus (e.g. practice-guide
/// excerpts) and are exempt from verification. Consumers pattern-match on
/// this tag rather than relying on any inherited behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    General,
    Authoritative { category: String },
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::General
    }
}

/// One piece of retrieved evidence.
///
/// Immutable once produced by a retrieval call; `id` is assigned later by
/// the pipeline for citation-number mapping (1-based, stable within one
/// answer cycle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Backend-reported relevance confidence (0.0-1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub kind: SourceKind,
}

impl Source {
    /// Create a general (open-retrieval) source.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            url: url.into(),
            excerpt: None,
            confidence: None,
            kind: SourceKind::General,
        }
    }

    /// Create an authoritative source from the curated corpus.
    pub fn authoritative(
        title: impl Into<String>,
        url: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            kind: SourceKind::Authoritative {
                category: category.into(),
            },
            ..Self::new(title, url)
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self.kind, SourceKind::Authoritative { .. })
    }

    /// Title and excerpt concatenated — the text used for overlap scoring
    /// and near-duplicate detection.
    pub fn match_text(&self) -> String {
        match &self.excerpt {
            Some(excerpt) => format!("{} {}", self.title, excerpt),
            None => self.title.clone(),
        }
    }
}

/// The three mutually exclusive evidence modes for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Curated corpus only; verification is skipped entirely.
    Authoritative,
    /// Open retrieval; the full verification pipeline runs.
    General,
    /// Curated sources merged with open retrieval; verification applies to
    /// the non-authoritative portion only.
    Hybrid,
}

/// Coarse classification of a checkable claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Statute,
    Case,
    Fact,
}

/// A sentence-level factual assertion extracted from a generated answer.
///
/// Derived, never persisted; recomputed per answer. `cites` holds the
/// 1-based source ids of any inline citation markers found in the sentence
/// and may be empty (uncited claims are still checkable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub cites: Vec<usize>,
    pub kind: ClaimKind,
}

/// Verbatim supporting quotes located for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedQuote {
    pub claim: String,
    pub quotes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<usize>,
}

/// The structured result of re-checking an answer's claims against evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Fraction of claims found supported, in [0, 1].
    pub coverage: f64,
    /// Minimum number of supporting quotes found for any supported claim.
    pub min_support: u32,
    /// Set when sources conflict with one another.
    pub ambiguity: bool,
    pub supported_claims: Vec<Claim>,
    pub unsupported_claims: Vec<Claim>,
    pub verified_quotes: Vec<VerifiedQuote>,
}

impl VerificationReport {
    /// Build a report from a supported/unsupported partition, computing
    /// coverage as supported / (supported + unsupported). Zero claims is
    /// treated as fully covered by policy.
    pub fn from_partition(
        supported_claims: Vec<Claim>,
        unsupported_claims: Vec<Claim>,
        min_support: u32,
        ambiguity: bool,
        verified_quotes: Vec<VerifiedQuote>,
    ) -> Self {
        let total = supported_claims.len() + unsupported_claims.len();
        let coverage = if total == 0 {
            1.0
        } else {
            supported_claims.len() as f64 / total as f64
        };
        Self {
            coverage,
            min_support,
            ambiguity,
            supported_claims,
            unsupported_claims,
            verified_quotes,
        }
    }

    /// A report for an answer with no checkable assertions.
    pub fn fully_covered() -> Self {
        Self {
            coverage: 1.0,
            min_support: 1,
            ambiguity: false,
            supported_claims: Vec::new(),
            unsupported_claims: Vec::new(),
            verified_quotes: Vec::new(),
        }
    }

    /// The safest report when verifier output could not be parsed:
    /// nothing supported, ambiguity assumed.
    pub fn unparseable() -> Self {
        Self {
            coverage: 0.0,
            min_support: 0,
            ambiguity: true,
            supported_claims: Vec::new(),
            unsupported_claims: Vec::new(),
            verified_quotes: Vec::new(),
        }
    }

    pub fn claim_count(&self) -> usize {
        self.supported_claims.len() + self.unsupported_claims.len()
    }
}

/// Trust level assigned to an answer by the confidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    PartiallyVerified,
    Refusal,
    Unverified,
    /// Reserved for answers built exclusively from authoritative sources.
    NotNeeded,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::PartiallyVerified => write!(f, "partially_verified"),
            VerificationStatus::Refusal => write!(f, "refusal"),
            VerificationStatus::Unverified => write!(f, "unverified"),
            VerificationStatus::NotNeeded => write!(f, "not_needed"),
        }
    }
}

/// Result of the deterministic post-gating guardrail checks.
///
/// Purely advisory once a status has been set: errors mark the report
/// `blocked` and surface a warning suffix, but never retract a gated status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub passed: bool,
    pub blocked: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GuardrailReport {
    pub fn passing() -> Self {
        Self {
            passed: true,
            blocked: false,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Fold another check's result into this one.
    pub fn merge(&mut self, other: GuardrailReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.passed = self.errors.is_empty();
        self.blocked = !self.errors.is_empty();
    }
}

/// The final answer object returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<VerificationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_report: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<Claim>>,
    #[serde(default)]
    pub is_authoritative: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mode: Option<SourceMode>,
}

impl Answer {
    /// A plain answer with no verification metadata attached.
    pub fn plain(text: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            text: text.into(),
            sources,
            verification_status: None,
            verification_report: None,
            claims: None,
            is_authoritative: false,
            source_mode: None,
        }
    }
}

/// Assign 1-based citation ids to a source list, in order.
pub fn number_sources(sources: &mut [Source]) {
    for (i, source) in sources.iter_mut().enumerate() {
        source.id = Some(i + 1);
    }
}
