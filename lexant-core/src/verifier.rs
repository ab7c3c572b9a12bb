//! Answer verification — re-check extracted claims against the retrieved
//! evidence with one structured generative call.
//!
//! The verification call is instructed to locate 1-2 verbatim supporting
//! quotes per claim, classify each claim supported/unsupported, flag
//! ambiguity when sources conflict, and propose either the original answer
//! unchanged (full coverage) or a rewrite with unsupported material removed.
//! The output is parsed tolerantly; a parse failure degrades
//! deterministically to the unverified status, never to silent success.

use crate::error::LlmError;
use crate::providers::{GenerationRequest, GenerativeProvider};
use crate::types::{Claim, ClaimKind, Source, VerificationReport, VerifiedQuote};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The verifier's result for one answer.
#[derive(Debug, Clone)]
pub struct VerifierOutcome {
    /// The answer to show: the original on full coverage, or the model's
    /// rewrite with unsupported material removed.
    pub verified_answer: String,
    pub report: VerificationReport,
    /// Set when the verification output could not be parsed; the caller
    /// must report `unverified` rather than gating the report.
    pub parse_failed: bool,
}

#[derive(Debug, Deserialize)]
struct PayloadClaim {
    text: String,
    #[serde(default)]
    supported: bool,
    #[serde(default)]
    quotes: Vec<String>,
    #[serde(default)]
    source_id: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct VerifierPayload {
    #[serde(default)]
    claims: Vec<PayloadClaim>,
    #[serde(default)]
    ambiguity: bool,
    #[serde(default)]
    coverage: Option<f64>,
    #[serde(default)]
    verified_answer: Option<String>,
}

pub struct Verifier {
    provider: Arc<dyn GenerativeProvider>,
}

impl Verifier {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self { provider }
    }

    /// Verify an answer's claims against the supplied sources.
    ///
    /// Zero claims short-circuits to a fully covered report without any
    /// model call: an answer with no checkable assertions cannot be
    /// unsupported. Cancellation propagates; any other verification-call
    /// failure degrades to the parse-failed outcome.
    pub async fn verify(
        &self,
        answer: &str,
        claims: &[Claim],
        sources: &[Source],
        cancel: &CancellationToken,
    ) -> Result<VerifierOutcome, LlmError> {
        if claims.is_empty() {
            debug!("No checkable claims extracted, skipping verification call");
            return Ok(VerifierOutcome {
                verified_answer: answer.to_string(),
                report: VerificationReport::fully_covered(),
                parse_failed: false,
            });
        }
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let request = GenerationRequest::new(build_verification_prompt(answer, claims, sources))
            .with_system(VERIFIER_SYSTEM);

        let generation = match self.provider.generate(&request).await {
            Ok(generation) => generation,
            Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Verification call failed, reporting unverified");
                return Ok(Self::failed_outcome(answer));
            }
        };

        match parse_verifier_output(&generation.text, claims) {
            Some((report, rewritten)) => Ok(VerifierOutcome {
                verified_answer: rewritten.unwrap_or_else(|| answer.to_string()),
                report,
                parse_failed: false,
            }),
            None => {
                warn!("Verifier output was not parseable, reporting unverified");
                Ok(Self::failed_outcome(answer))
            }
        }
    }

    fn failed_outcome(answer: &str) -> VerifierOutcome {
        VerifierOutcome {
            verified_answer: answer.to_string(),
            report: VerificationReport::unparseable(),
            parse_failed: true,
        }
    }
}

const VERIFIER_SYSTEM: &str = "You are a meticulous legal fact-checker. \
You only rely on the provided sources, and you answer in strict JSON.";

fn build_verification_prompt(answer: &str, claims: &[Claim], sources: &[Source]) -> String {
    let mut prompt = String::from(
        "Check each claim below against the sources. For each claim, find 1-2 \
         verbatim supporting quotes from the sources and classify it as supported \
         or unsupported. Set \"ambiguity\" to true only if sources conflict with \
         each other. Compute \"coverage\" as supported divided by total claims. \
         If every claim is supported, return the answer unchanged as \
         \"verified_answer\"; otherwise return a rewrite with unsupported \
         material removed, preserving the existing [n] citation markers.\n\
         Respond with JSON only:\n\
         {\"claims\": [{\"text\": \"...\", \"supported\": true, \"quotes\": [\"...\"], \
         \"source_id\": 1}], \"ambiguity\": false, \"coverage\": 1.0, \
         \"verified_answer\": \"...\"}\n\n",
    );

    prompt.push_str("SOURCES:\n");
    for source in sources {
        let id = source.id.map(|i| i.to_string()).unwrap_or_default();
        prompt.push_str(&format!("[{id}] {} — {}\n", source.title, source.url));
        if let Some(ref excerpt) = source.excerpt {
            prompt.push_str(&format!("    {excerpt}\n"));
        }
    }

    prompt.push_str("\nCLAIMS:\n");
    for (i, claim) in claims.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, claim.text));
    }

    prompt.push_str("\nANSWER:\n");
    prompt.push_str(answer);
    prompt
}

/// Pull a JSON object out of model output that may wrap it in commentary
/// or a fenced code block.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(fenced) = trimmed.split("```").nth(1) {
        let body = fenced.strip_prefix("json").unwrap_or(fenced).trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Parse the verifier's JSON into a report plus an optional rewritten
/// answer. Returns `None` when the output is not valid JSON.
fn parse_verifier_output(
    text: &str,
    input_claims: &[Claim],
) -> Option<(VerificationReport, Option<String>)> {
    let payload: VerifierPayload = serde_json::from_str(extract_json(text)?).ok()?;

    let find_claim = |text: &str| -> Claim {
        input_claims
            .iter()
            .find(|c| c.text.trim().eq_ignore_ascii_case(text.trim()))
            .cloned()
            .unwrap_or(Claim {
                text: text.to_string(),
                cites: Vec::new(),
                kind: ClaimKind::Fact,
            })
    };

    let mut supported = Vec::new();
    let mut unsupported = Vec::new();
    let mut quotes = Vec::new();
    let mut min_support: Option<u32> = None;

    for entry in &payload.claims {
        let claim = find_claim(&entry.text);
        if entry.supported {
            min_support = Some(min_support.map_or(entry.quotes.len() as u32, |m| {
                m.min(entry.quotes.len() as u32)
            }));
            if !entry.quotes.is_empty() {
                quotes.push(VerifiedQuote {
                    claim: claim.text.clone(),
                    quotes: entry.quotes.clone(),
                    source_id: entry.source_id,
                });
            }
            supported.push(claim);
        } else {
            unsupported.push(claim);
        }
    }

    // Any input claim the model never mentioned counts as unsupported.
    for claim in input_claims {
        let mentioned = payload
            .claims
            .iter()
            .any(|e| e.text.trim().eq_ignore_ascii_case(claim.text.trim()));
        if !mentioned {
            unsupported.push(claim.clone());
        }
    }

    let report = VerificationReport::from_partition(
        supported,
        unsupported,
        min_support.unwrap_or(0),
        payload.ambiguity,
        quotes,
    );

    // The model also reports coverage; clamp it and prefer the computed
    // value when they disagree so the report invariant always holds.
    if let Some(model_coverage) = payload.coverage {
        let clamped = model_coverage.clamp(0.0, 1.0);
        if (clamped - report.coverage).abs() > 0.01 {
            debug!(
                model_coverage = clamped,
                computed = report.coverage,
                "Verifier-reported coverage disagrees with computed value"
            );
        }
    }

    let rewritten = payload
        .verified_answer
        .filter(|text| !text.trim().is_empty());
    Some((report, rewritten))
}
