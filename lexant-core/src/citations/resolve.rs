//! Citation resolution.
//!
//! Code citations resolve by deterministic URL construction against the
//! legislature's public code browser — no network call. Case citations
//! require a lookup against the case-law search backend, run in small
//! batches to respect external rate limits, with a process-wide resolution
//! cache and a generic search-link fallback when no exact match is found
//! or the lookup errors.

use crate::citations::extract::{CaseCitation, CodeCitation};
use crate::citations::registry::law_code_for;
use crate::error::SearchError;
use crate::retrieval::{SearchBackend, SearchOptions};
use crate::types::Source;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const LEGINFO_BASE: &str =
    "https://leginfo.legislature.ca.gov/faces/codes_displaySection.xhtml";

/// Simultaneous in-flight case lookups are capped at this batch size.
const CASE_LOOKUP_BATCH: usize = 3;

/// Process-wide case-resolution cache. Races on identical keys are benign:
/// the same value is computed twice and the second write overwrites with
/// equivalent data.
static RESOLUTION_CACHE: LazyLock<Mutex<HashMap<String, Option<Source>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A sub-part is carried into the URL only when it is a single letter;
/// anything else falls back to the bare section number.
fn valid_subpart(subpart: &str) -> Option<String> {
    let mut chars = subpart.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_lowercase().to_string()),
        _ => None,
    }
}

/// Resolve a code citation to a reference source by URL construction.
///
/// Returns `None` when the code name is not in the registry.
pub fn resolve_code_citation(citation: &CodeCitation) -> Option<Source> {
    let law_code = law_code_for(&citation.code_name)?;
    let section_num = match citation.subpart.as_deref().and_then(valid_subpart) {
        Some(sub) => format!("{}.{}", citation.section, sub),
        None => citation.section.clone(),
    };
    let url = format!("{LEGINFO_BASE}?lawCode={law_code}&sectionNum={section_num}");

    let title = match &citation.subpart {
        Some(sub) => format!("{} § {}({})", citation.code_name, citation.section, sub),
        None => format!("{} § {}", citation.code_name, citation.section),
    };
    Some(Source::new(title, url))
}

/// Build the generic search-link fallback for an unresolvable case citation.
fn fallback_case_link(citation: &CaseCitation) -> Source {
    let query = urlencoding::encode(&citation.case_name);
    Source::new(
        citation.case_name.clone(),
        format!("https://scholar.google.com/scholar?hl=en&as_sdt=4,5&q=%22{query}%22"),
    )
}

fn cache_key(citation: &CaseCitation) -> String {
    citation
        .raw
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves case citations against the case-law search backend.
pub struct CitationResolver {
    case_law: Arc<dyn SearchBackend>,
}

impl CitationResolver {
    pub fn new(case_law: Arc<dyn SearchBackend>) -> Self {
        Self { case_law }
    }

    /// Resolve a batch of case citations, at most `CASE_LOOKUP_BATCH`
    /// lookups in flight at a time. Unresolvable citations yield the
    /// search-link fallback; cancellation stops the remaining batches.
    pub async fn resolve_cases(
        &self,
        citations: &[CaseCitation],
        cancel: &CancellationToken,
    ) -> Vec<Source> {
        let mut resolved = Vec::new();
        for chunk in citations.chunks(CASE_LOOKUP_BATCH) {
            if cancel.is_cancelled() {
                break;
            }
            let lookups = chunk.iter().map(|c| self.resolve_case(c, cancel));
            for source in futures::future::join_all(lookups).await.into_iter().flatten() {
                resolved.push(source);
            }
        }
        resolved
    }

    /// Resolve one case citation, consulting the process-wide cache first.
    pub async fn resolve_case(
        &self,
        citation: &CaseCitation,
        cancel: &CancellationToken,
    ) -> Option<Source> {
        let key = cache_key(citation);
        if let Some(cached) = RESOLUTION_CACHE.lock().unwrap().get(&key) {
            return cached.clone();
        }
        if cancel.is_cancelled() {
            return None;
        }

        let query = match &citation.reporter {
            Some(r) => format!(
                "{} {} {} {}",
                citation.case_name, r.volume, r.reporter, r.page
            ),
            None => citation.case_name.clone(),
        };

        let result = match self
            .case_law
            .search(&query, &SearchOptions::with_limit(3), cancel)
            .await
        {
            Ok(response) => {
                let needle = citation.case_name.to_lowercase();
                response
                    .sources
                    .into_iter()
                    .find(|s| s.title.to_lowercase().contains(&needle))
                    .or_else(|| Some(fallback_case_link(citation)))
            }
            Err(SearchError::Cancelled) => return None, // do not cache
            Err(e) => {
                warn!(
                    case = citation.case_name.as_str(),
                    error = %e,
                    "Case lookup failed, using search-link fallback"
                );
                Some(fallback_case_link(citation))
            }
        };

        RESOLUTION_CACHE
            .lock()
            .unwrap()
            .insert(key, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SearchResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn code(name: &str, section: &str, subpart: Option<&str>) -> CodeCitation {
        CodeCitation {
            raw: format!("{name} § {section}"),
            code_name: name.into(),
            section: section.into(),
            subpart: subpart.map(String::from),
        }
    }

    fn case(name: &str) -> CaseCitation {
        CaseCitation {
            raw: name.to_string(),
            case_name: name.to_string(),
            reporter: None,
            year: None,
        }
    }

    #[test]
    fn test_resolve_family_code_with_subpart() {
        let source = resolve_code_citation(&code("Family Code", "1615", Some("c"))).unwrap();
        assert!(source.url.contains("lawCode=FAM"));
        assert!(source.url.contains("sectionNum=1615.c"));
        assert_eq!(source.title, "Family Code § 1615(c)");
    }

    #[test]
    fn test_resolve_invalid_subpart_falls_back_to_section() {
        let source = resolve_code_citation(&code("Family Code", "1615", Some("xyz"))).unwrap();
        assert!(source.url.contains("sectionNum=1615"));
        assert!(!source.url.contains("sectionNum=1615."));
    }

    #[test]
    fn test_resolve_numeric_subpart_is_invalid() {
        let source = resolve_code_citation(&code("Penal Code", "187", Some("1"))).unwrap();
        assert!(source.url.ends_with("lawCode=PEN&sectionNum=187"));
    }

    #[test]
    fn test_resolve_decimal_section() {
        let source = resolve_code_citation(&code("Fam. Code", "271.5", None)).unwrap();
        assert!(source.url.contains("lawCode=FAM"));
        assert!(source.url.contains("sectionNum=271.5"));
    }

    #[test]
    fn test_resolve_unknown_code_is_none() {
        assert!(resolve_code_citation(&code("Maritime Code", "12", None)).is_none());
    }

    struct QueuedCaseLaw {
        sources: Vec<Source>,
        calls: AtomicU32,
        error: Option<SearchError>,
    }

    #[async_trait]
    impl SearchBackend for QueuedCaseLaw {
        fn name(&self) -> &str {
            "caselaw"
        }
        async fn search(
            &self,
            _query: &str,
            _options: &SearchOptions,
            _cancel: &CancellationToken,
        ) -> Result<SearchResponse, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.error {
                Some(e) => Err(e.clone()),
                None => Ok(SearchResponse {
                    content: String::new(),
                    sources: self.sources.clone(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_case_resolution_exact_match() {
        let backend = Arc::new(QueuedCaseLaw {
            sources: vec![
                Source::new("Unrelated decision", "https://law.example.com/other"),
                Source::new(
                    "Marvin v. Marvin (1976)",
                    "https://law.example.com/marvin",
                ),
            ],
            calls: AtomicU32::new(0),
            error: None,
        });
        let resolver = CitationResolver::new(backend);
        let source = resolver
            .resolve_case(&case("Marvin v. Marvin"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(source.url, "https://law.example.com/marvin");
    }

    #[tokio::test]
    async fn test_case_resolution_fallback_on_no_match() {
        let backend = Arc::new(QueuedCaseLaw {
            sources: vec![Source::new("Something else", "https://law.example.com/x")],
            calls: AtomicU32::new(0),
            error: None,
        });
        let resolver = CitationResolver::new(backend);
        let source = resolver
            .resolve_case(&case("Nobody v. Nothing"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(source.url.starts_with("https://scholar.google.com/scholar"));
        assert!(source.url.contains("Nobody"));
    }

    #[tokio::test]
    async fn test_case_resolution_fallback_on_error() {
        let backend = Arc::new(QueuedCaseLaw {
            sources: vec![],
            calls: AtomicU32::new(0),
            error: Some(SearchError::Upstream { status: 503 }),
        });
        let resolver = CitationResolver::new(backend);
        let source = resolver
            .resolve_case(&case("Errored v. Lookup"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(source.url.starts_with("https://scholar.google.com/scholar"));
    }

    #[tokio::test]
    async fn test_case_resolution_is_cached() {
        let backend = Arc::new(QueuedCaseLaw {
            sources: vec![Source::new(
                "Cached v. Lookup",
                "https://law.example.com/cached",
            )],
            calls: AtomicU32::new(0),
            error: None,
        });
        let resolver = CitationResolver::new(backend.clone());
        let cancel = CancellationToken::new();
        resolver
            .resolve_case(&case("Cached v. Lookup"), &cancel)
            .await
            .unwrap();
        resolver
            .resolve_case(&case("Cached v. Lookup"), &cancel)
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_lookup_not_cached() {
        let backend = Arc::new(QueuedCaseLaw {
            sources: vec![],
            calls: AtomicU32::new(0),
            error: None,
        });
        let resolver = CitationResolver::new(backend.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = resolver
            .resolve_case(&case("Stopped v. Early"), &cancel)
            .await;
        assert!(result.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        // A later, uncancelled attempt still performs the lookup.
        let result = resolver
            .resolve_case(&case("Stopped v. Early"), &CancellationToken::new())
            .await;
        assert!(result.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batched_resolution_returns_all() {
        let backend = Arc::new(QueuedCaseLaw {
            sources: vec![],
            calls: AtomicU32::new(0),
            error: None,
        });
        let resolver = CitationResolver::new(backend);
        let citations: Vec<CaseCitation> = (0..7)
            .map(|i| case(&format!("Batch{i} v. Batch{i}")))
            .collect();
        let resolved = resolver
            .resolve_cases(&citations, &CancellationToken::new())
            .await;
        assert_eq!(resolved.len(), 7); // all fall back to search links
    }
}
