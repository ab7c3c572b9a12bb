//! The assistant engine — orchestrates one user turn through the full
//! pipeline: embedding lookup, retrieval fan-out, pruning, generation,
//! citation resolution, claim extraction, verification, confidence gating,
//! and guardrails, strictly in that order.
//!
//! One cancellation token is created per turn and threaded through every
//! suspension point. Submitting a new turn cancels the prior turn's token
//! (single-flight per conversation), so a stale answer can never be
//! applied over a newer one.

use crate::citations::extract::{CaseCitation, Citation, extract_citations};
use crate::citations::resolve::{CitationResolver, resolve_code_citation};
use crate::claims::extract_claims;
use crate::config::AssistantConfig;
use crate::embedding::EmbeddingCache;
use crate::error::{LexantError, LlmError, Result};
use crate::gate::gate;
use crate::guardrails::{run_guardrails, warning_suffix};
use crate::providers::{GenerationRequest, GenerativeProvider, HistoryTurn, with_retry};
use crate::retrieval::{RetrievalOutcome, Retriever, SearchOptions};
use crate::retrieval::pruner::prune;
use crate::types::{
    Answer, Source, SourceMode, VerificationStatus, number_sources,
};
use crate::verifier::Verifier;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phrases that switch a request into exhaustive mode.
const EXHAUSTIVE_PHRASES: &[&str] = &[
    "all cases",
    "every case",
    "exhaustive",
    "complete list",
    "comprehensive list",
    "full list",
];

const SYSTEM_PROMPT: &str = "You are a California legal research assistant. Answer only \
from the numbered sources provided, cite them inline with [n] markers, and stay within \
California law unless the question asks otherwise. You provide legal information, not \
legal advice.";

const CONNECTION_TROUBLE: &str = "I'm having trouble connecting to the research service \
right now. Please try again in a moment.";

const UNVERIFIED_CAVEAT: &str = "This answer could not be verified against the retrieved \
sources; treat it as a starting point only.";

/// One user turn's input.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub mode: SourceMode,
    pub history: Vec<HistoryTurn>,
    /// Curated sources supplied by the caller for the authoritative and
    /// hybrid modes.
    pub authoritative_sources: Vec<Source>,
}

impl AskRequest {
    pub fn general(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            mode: SourceMode::General,
            history: Vec::new(),
            authoritative_sources: Vec::new(),
        }
    }
}

/// Detect the exhaustive-mode request flag from question phrasing.
pub fn is_exhaustive_request(question: &str) -> bool {
    let lowered = question.to_lowercase();
    EXHAUSTIVE_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Expand one query into topical variants for the exhaustive fan-out.
fn expand_query_variants(question: &str) -> Vec<String> {
    vec![
        question.to_string(),
        format!("{question} California case law"),
        format!("{question} California statutes"),
        format!("{question} California appellate decisions"),
    ]
}

pub struct AssistantEngine {
    provider: Arc<dyn GenerativeProvider>,
    retriever: Retriever,
    resolver: Option<CitationResolver>,
    embeddings: Arc<EmbeddingCache>,
    verifier: Verifier,
    config: AssistantConfig,
    /// Token of the turn currently in flight; a new turn cancels it.
    inflight: Mutex<Option<CancellationToken>>,
}

impl AssistantEngine {
    pub fn new(
        provider: Arc<dyn GenerativeProvider>,
        retriever: Retriever,
        resolver: Option<CitationResolver>,
        embeddings: Arc<EmbeddingCache>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            verifier: Verifier::new(provider.clone()),
            provider,
            retriever,
            resolver,
            embeddings,
            config,
            inflight: Mutex::new(None),
        }
    }

    /// Start a turn, cancelling any still-in-flight prior turn.
    fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(prior) = inflight.replace(token.clone()) {
            prior.cancel();
        }
        token
    }

    /// Answer one user question.
    ///
    /// A superseded turn returns the cancellation error; its result must
    /// never be applied to the visible conversation.
    pub async fn ask(&self, request: AskRequest) -> Result<Answer> {
        let cancel = self.begin_turn();
        let answer = self.run_turn(&request, &cancel).await?;
        if cancel.is_cancelled() {
            return Err(LexantError::Llm(LlmError::Cancelled));
        }
        Ok(answer)
    }

    async fn run_turn(&self, request: &AskRequest, cancel: &CancellationToken) -> Result<Answer> {
        if request.mode == SourceMode::Authoritative {
            return self.answer_authoritative(request, cancel).await;
        }

        let exhaustive = is_exhaustive_request(&request.question);
        if exhaustive {
            info!("Exhaustive mode detected, pruning disabled");
        }

        // The query embedding is computed once per turn; the cache hit flag
        // is observable through logs only.
        let (query_vector, was_cached) = self
            .embeddings
            .get(&request.question, cancel)
            .await
            .map_err(LexantError::Embed)?;
        debug!(cached = was_cached, "Query embedding ready");

        let mut retrieval = self.retrieve_evidence(request, exhaustive, query_vector, cancel).await?;
        let has_bill_text = retrieval.has_primary_text();

        let retrieved_sources = std::mem::take(&mut retrieval.sources);
        let mut sources = if exhaustive {
            retrieved_sources
        } else {
            prune(
                retrieved_sources,
                &request.question,
                self.config.retrieval.max_sources,
                self.config.retrieval.dedup_threshold,
            )
        };

        if request.mode == SourceMode::Hybrid {
            sources = merge_authoritative(request.authoritative_sources.clone(), sources);
        }
        number_sources(&mut sources);

        let generation = match self.generate_answer(request, &sources, &retrieval, cancel).await {
            Ok(generation) => generation,
            Err(LlmError::Cancelled) => return Err(LexantError::Llm(LlmError::Cancelled)),
            Err(e) => {
                warn!(error = %e, "Generation failed after retries and fallback");
                return Ok(Answer::plain(CONNECTION_TROUBLE, Vec::new()));
            }
        };
        let has_grounding = generation.grounding_used;
        let answer_text = generation.text;

        self.attach_cited_references(&answer_text, &mut sources, cancel)
            .await;

        // Claim extraction and verification see the same final source list.
        let claims = extract_claims(&answer_text, &sources);
        let verify_sources: Vec<Source> = sources
            .iter()
            .filter(|s| !s.is_authoritative())
            .cloned()
            .collect();
        let outcome = self
            .verifier
            .verify(&answer_text, &claims, &verify_sources, cancel)
            .await
            .map_err(LexantError::Llm)?;

        let (status, should_show, caveat) = if outcome.parse_failed {
            (
                VerificationStatus::Unverified,
                true,
                Some(UNVERIFIED_CAVEAT.to_string()),
            )
        } else {
            let decision = gate(
                &outcome.report,
                &self.config.verification,
                has_bill_text,
                has_grounding,
            );
            (decision.status, decision.should_show, decision.caveat)
        };

        let mut text = if should_show {
            outcome.verified_answer.clone()
        } else {
            // The generated text is never shown once gated as a refusal.
            caveat.clone().unwrap_or_default()
        };
        if should_show {
            if let Some(ref caveat) = caveat {
                text.push_str("\n\n");
                text.push_str(caveat);
            }
            let guardrails = run_guardrails(&text, &request.question, &sources);
            if let Some(suffix) = warning_suffix(&guardrails) {
                text.push_str("\n\n");
                text.push_str(&suffix);
            }
        }

        Ok(Answer {
            text,
            sources,
            verification_status: Some(status),
            verification_report: Some(outcome.report),
            claims: Some(claims),
            is_authoritative: false,
            source_mode: Some(request.mode),
        })
    }

    /// Authoritative mode: answer from the curated corpus only, with
    /// verification, gating, and guardrails bypassed entirely.
    async fn answer_authoritative(
        &self,
        request: &AskRequest,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let mut sources = request.authoritative_sources.clone();
        number_sources(&mut sources);

        let prompt = build_answer_prompt(&request.question, &sources, None);
        let generation_request = GenerationRequest {
            prompt,
            system_instruction: Some(SYSTEM_PROMPT.to_string()),
            history: request.history.clone(),
            temperature: self.config.llm.temperature,
            use_grounding: false,
        };
        let generation = match with_retry(&self.config.llm.retry, cancel, || {
            self.provider.generate(&generation_request)
        })
        .await
        {
            Ok(generation) => generation,
            Err(LlmError::Cancelled) => return Err(LexantError::Llm(LlmError::Cancelled)),
            Err(e) => {
                warn!(error = %e, "Authoritative generation failed");
                return Ok(Answer::plain(CONNECTION_TROUBLE, Vec::new()));
            }
        };

        Ok(Answer {
            text: generation.text,
            sources,
            verification_status: Some(VerificationStatus::NotNeeded),
            verification_report: None,
            claims: None,
            is_authoritative: true,
            source_mode: Some(SourceMode::Authoritative),
        })
    }

    async fn retrieve_evidence(
        &self,
        request: &AskRequest,
        exhaustive: bool,
        query_vector: Vec<f32>,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome> {
        let limit = if exhaustive {
            self.config.retrieval.exhaustive_limit
        } else {
            self.config.retrieval.result_limit
        };
        let options = SearchOptions {
            limit,
            query_vector: Some(query_vector),
            ..Default::default()
        };

        if !exhaustive {
            return self
                .retriever
                .retrieve(&request.question, &options, cancel)
                .await
                .map_err(LexantError::Search);
        }

        // Exhaustive mode: several topical variants searched in parallel,
        // merged with the same last-write-wins URL dedup.
        let variants = expand_query_variants(&request.question);
        let searches = variants
            .iter()
            .map(|variant| self.retriever.retrieve(variant, &options, cancel));
        let mut merged = RetrievalOutcome::default();
        let mut primary_parts = Vec::new();
        let mut seen = std::collections::HashMap::new();
        for result in futures::future::join_all(searches).await {
            // Per-backend failures already degraded inside the retriever,
            // so an error here is cancellation.
            let outcome = result.map_err(LexantError::Search)?;
            if let Some(text) = outcome.primary_text {
                primary_parts.push(text);
            }
            for source in outcome.sources {
                match seen.get(&source.url) {
                    Some(&idx) => merged.sources[idx] = source,
                    None => {
                        seen.insert(source.url.clone(), merged.sources.len());
                        merged.sources.push(source);
                    }
                }
            }
        }
        if !primary_parts.is_empty() {
            merged.primary_text = Some(primary_parts.join("\n\n"));
        }
        Ok(merged)
    }

    async fn generate_answer(
        &self,
        request: &AskRequest,
        sources: &[Source],
        retrieval: &RetrievalOutcome,
        cancel: &CancellationToken,
    ) -> std::result::Result<crate::providers::Generation, LlmError> {
        let prompt = build_answer_prompt(
            &request.question,
            sources,
            retrieval.primary_text.as_deref(),
        );
        let generation_request = GenerationRequest {
            prompt,
            system_instruction: Some(SYSTEM_PROMPT.to_string()),
            history: request.history.clone(),
            temperature: self.config.llm.temperature,
            use_grounding: self.config.llm.enable_grounding && self.provider.supports_grounding(),
        };
        with_retry(&self.config.llm.retry, cancel, || {
            self.provider.generate(&generation_request)
        })
        .await
    }

    /// Resolve citations appearing in the generated answer and append any
    /// new reference sources, keeping existing citation numbers stable.
    async fn attach_cited_references(
        &self,
        answer_text: &str,
        sources: &mut Vec<Source>,
        cancel: &CancellationToken,
    ) {
        let mut case_citations: Vec<CaseCitation> = Vec::new();
        let mut resolved: Vec<Source> = Vec::new();
        for citation in extract_citations(answer_text) {
            match citation {
                Citation::Code(code) => {
                    if let Some(source) = resolve_code_citation(&code) {
                        resolved.push(source);
                    }
                }
                Citation::Case(case) => case_citations.push(case),
            }
        }
        if let Some(ref resolver) = self.resolver {
            resolved.extend(resolver.resolve_cases(&case_citations, cancel).await);
        }

        let mut appended = false;
        for source in resolved {
            if sources.iter().any(|s| s.url == source.url) {
                continue;
            }
            sources.push(source);
            appended = true;
        }
        if appended {
            number_sources(sources);
        }
    }
}

/// Merge curated sources ahead of retrieved ones, dropping retrieved
/// duplicates of a curated URL.
fn merge_authoritative(authoritative: Vec<Source>, retrieved: Vec<Source>) -> Vec<Source> {
    let mut merged = authoritative;
    for source in retrieved {
        if !merged.iter().any(|s| s.url == source.url) {
            merged.push(source);
        }
    }
    merged
}

fn build_answer_prompt(question: &str, sources: &[Source], primary_text: Option<&str>) -> String {
    let mut prompt = String::from("SOURCES:\n");
    for source in sources {
        let id = source.id.map(|i| i.to_string()).unwrap_or_default();
        prompt.push_str(&format!("[{id}] {} — {}\n", source.title, source.url));
        if let Some(ref excerpt) = source.excerpt {
            prompt.push_str(&format!("    {excerpt}\n"));
        }
    }
    if let Some(text) = primary_text {
        prompt.push_str("\nFULL TEXT:\n");
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt.push_str("\nQUESTION:\n");
    prompt.push_str(question);
    prompt
}
