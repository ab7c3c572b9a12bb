//! Concrete search backends.
//!
//! Thin HTTP adapters from external services onto the `SearchBackend`
//! contract. Empty result sets are valid responses; only transport and
//! HTTP failures become errors.

use crate::error::SearchError;
use crate::retrieval::{SearchBackend, SearchOptions, SearchResponse};
use crate::types::Source;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const COURTLISTENER_BASE: &str = "https://www.courtlistener.com";

/// Case-law search against the CourtListener opinion index.
pub struct CourtListenerBackend {
    client: reqwest::Client,
    base_url: String,
}

impl CourtListenerBackend {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| COURTLISTENER_BASE.to_string()),
        }
    }

    fn parse_response(base_url: &str, data: &Value, limit: usize) -> Vec<Source> {
        let Some(results) = data["results"].as_array() else {
            return Vec::new();
        };
        results
            .iter()
            .take(limit.max(1))
            .filter_map(|r| {
                let title = r["caseName"].as_str()?;
                let path = r["absolute_url"].as_str()?;
                let mut source =
                    Source::new(title, format!("{base_url}{path}"));
                if let Some(snippet) = r["snippet"].as_str() {
                    source = source.with_excerpt(snippet);
                }
                if let Some(score) = r["meta"]["score"]["bm25"].as_f64() {
                    source = source.with_confidence((score / 10.0).clamp(0.0, 1.0) as f32);
                }
                Some(source)
            })
            .collect()
    }
}

#[async_trait]
impl SearchBackend for CourtListenerBackend {
    fn name(&self) -> &str {
        "courtlistener"
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        let url = format!(
            "{}/api/rest/v4/search/?type=o&court=cal%20calctapp&q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        debug!(query, "Searching CourtListener");

        let request = self.client.get(&url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            response = request => response.map_err(|e| SearchError::Transport {
                message: format!("CourtListener request failed: {e}"),
            })?,
        };

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(SearchError::Upstream { status });
        }
        if status >= 400 {
            return Err(SearchError::Client { status });
        }

        let data: Value = response.json().await.map_err(|e| SearchError::Transport {
            message: format!("CourtListener response body unreadable: {e}"),
        })?;

        Ok(SearchResponse {
            content: String::new(),
            sources: Self::parse_response(&self.base_url, &data, options.limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_results() {
        let data = json!({
            "results": [
                {
                    "caseName": "Marvin v. Marvin",
                    "absolute_url": "/opinion/123/marvin-v-marvin/",
                    "snippet": "property rights of nonmarital partners",
                    "meta": {"score": {"bm25": 7.5}}
                },
                {
                    "caseName": "In re Marriage of Bonds",
                    "absolute_url": "/opinion/456/bonds/",
                }
            ]
        });
        let sources =
            CourtListenerBackend::parse_response("https://www.courtlistener.com", &data, 5);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Marvin v. Marvin");
        assert_eq!(
            sources[0].url,
            "https://www.courtlistener.com/opinion/123/marvin-v-marvin/"
        );
        assert_eq!(
            sources[0].excerpt.as_deref(),
            Some("property rights of nonmarital partners")
        );
        assert!(sources[0].confidence.unwrap() > 0.7);
        assert!(sources[1].excerpt.is_none());
    }

    #[test]
    fn test_parse_respects_limit() {
        let data = json!({
            "results": [
                {"caseName": "A", "absolute_url": "/a/"},
                {"caseName": "B", "absolute_url": "/b/"},
                {"caseName": "C", "absolute_url": "/c/"}
            ]
        });
        let sources = CourtListenerBackend::parse_response("https://x", &data, 2);
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_parse_empty_results_is_valid() {
        let sources =
            CourtListenerBackend::parse_response("https://x", &json!({"results": []}), 5);
        assert!(sources.is_empty());

        let sources = CourtListenerBackend::parse_response("https://x", &json!({}), 5);
        assert!(sources.is_empty());
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let data = json!({
            "results": [
                {"caseName": "Good", "absolute_url": "/good/"},
                {"absolute_url": "/missing-name/"},
                {"caseName": "No url"}
            ]
        });
        let sources = CourtListenerBackend::parse_response("https://x", &data, 5);
        assert_eq!(sources.len(), 1);
    }
}
