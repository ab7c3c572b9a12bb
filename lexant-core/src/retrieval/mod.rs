//! Evidence retrieval — parallel, cancellable, retried fan-out over
//! heterogeneous search backends.
//!
//! Each backend call is wrapped in a retry policy with exponential backoff
//! (client errors are never retried), a cancellation check, and isolated
//! failure handling: one backend's failure degrades to an empty result
//! rather than failing the whole fan-out. Merged results are deduplicated
//! by URL with last-write-wins semantics.

pub mod backends;
pub mod pruner;

use crate::config::RetryConfig;
use crate::error::SearchError;
use crate::types::Source;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Options passed through to a search backend.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub date_after: Option<NaiveDate>,
    pub date_before: Option<NaiveDate>,
    /// The query's embedding, computed once per turn and shared with any
    /// backend that searches a vector index.
    pub query_vector: Option<Vec<f32>>,
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// One backend's search result. Empty results are a valid answer, distinct
/// from a transport error.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Verbatim text returned by the backend (e.g. full bill text); empty
    /// when the backend only returns source listings.
    pub content: String,
    pub sources: Vec<Source>,
}

/// Trait for evidence search backends.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// A short name used in logs.
    fn name(&self) -> &str;

    /// Whether this backend returns verbatim primary-source text (statute
    /// or bill text) in `SearchResponse::content`.
    fn provides_primary_text(&self) -> bool {
        false
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError>;
}

/// Retry a search operation with doubling backoff.
///
/// Client errors return immediately; transport and upstream failures are
/// retried up to the bounded attempt count; a cancelled token aborts
/// without further retries.
pub async fn search_with_retry<F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> Result<SearchResponse, SearchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<SearchResponse, SearchError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        match operation().await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if !e.is_retryable() || attempt == config.max_retries {
                    return Err(e);
                }
                let backoff_ms = config
                    .initial_backoff_ms
                    .saturating_mul(1u64 << attempt.min(20))
                    .min(config.max_backoff_ms);
                warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying search after transient error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(SearchError::Transport {
        message: "All retry attempts exhausted".into(),
    }))
}

/// The merged outcome of one retrieval fan-out.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub sources: Vec<Source>,
    /// Concatenated verbatim primary-source text, when any backend
    /// supplying it returned content.
    pub primary_text: Option<String>,
}

impl RetrievalOutcome {
    pub fn has_primary_text(&self) -> bool {
        self.primary_text.is_some()
    }
}

/// Fans out one query to all configured backends concurrently.
pub struct Retriever {
    backends: Vec<Arc<dyn SearchBackend>>,
    retry: RetryConfig,
}

impl Retriever {
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>, retry: RetryConfig) -> Self {
        Self { backends, retry }
    }

    /// Search every backend in parallel and merge the results.
    ///
    /// A failing backend contributes nothing; cancellation propagates.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome, SearchError> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let calls = self.backends.iter().map(|backend| {
            let backend = Arc::clone(backend);
            async move {
                let result = search_with_retry(&self.retry, cancel, || {
                    backend.search(query, options, cancel)
                })
                .await;
                (backend, result)
            }
        });
        let results = futures::future::join_all(calls).await;

        let mut outcome = RetrievalOutcome::default();
        let mut primary_parts: Vec<String> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (backend, result) in results {
            let response = match result {
                Ok(response) => response,
                Err(SearchError::Cancelled) => return Err(SearchError::Cancelled),
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        "Search backend failed, continuing without it"
                    );
                    continue;
                }
            };

            if backend.provides_primary_text() && !response.content.is_empty() {
                primary_parts.push(response.content);
            }
            for source in response.sources {
                match seen.get(&source.url) {
                    // Exact URL collision: last write wins.
                    Some(&idx) => outcome.sources[idx] = source,
                    None => {
                        seen.insert(source.url.clone(), outcome.sources.len());
                        outcome.sources.push(source);
                    }
                }
            }
        }

        if !primary_parts.is_empty() {
            outcome.primary_text = Some(primary_parts.join("\n\n"));
        }
        Ok(outcome)
    }
}
