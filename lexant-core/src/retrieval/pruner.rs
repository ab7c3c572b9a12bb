//! Retrieval pruning — rerank by lexical overlap, drop near-duplicates,
//! truncate to a bounded top-K.
//!
//! The ordering (rerank, then dedupe, then truncate) is load-bearing:
//! deduping before ranking could discard the better-scoring of two
//! near-duplicates.

use crate::types::Source;
use std::collections::HashSet;

/// Minimum token length considered significant for overlap scoring.
const MIN_TOKEN_LEN: usize = 3;

/// Score a source by normalized token overlap with the query.
///
/// score = matched-query-token-count / distinct-query-token-count, using
/// only query tokens longer than two characters.
pub fn overlap_score(source: &Source, query: &str) -> f64 {
    let query_tokens: HashSet<String> = tokenize(query)
        .into_iter()
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .collect();
    if query_tokens.is_empty() {
        return 0.0;
    }

    let source_tokens: HashSet<String> = tokenize(&source.match_text()).into_iter().collect();
    let matched = query_tokens
        .iter()
        .filter(|t| source_tokens.contains(*t))
        .count();
    matched as f64 / query_tokens.len() as f64
}

/// Jaccard similarity over whitespace-tokenized, lowercased title+excerpt.
pub fn jaccard_similarity(a: &Source, b: &Source) -> f64 {
    let set_a: HashSet<String> = tokenize(&a.match_text()).into_iter().collect();
    let set_b: HashSet<String> = tokenize(&b.match_text()).into_iter().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Prune a source list for a query: rerank by overlap score, drop
/// near-duplicates above `dedup_threshold`, keep at most `max_k`.
///
/// Deterministic: ties in score preserve the input order, and of two
/// near-duplicates the higher-scored (earlier on ties) survives.
pub fn prune(
    sources: Vec<Source>,
    query: &str,
    max_k: usize,
    dedup_threshold: f64,
) -> Vec<Source> {
    if max_k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(f64, usize, Source)> = sources
        .into_iter()
        .enumerate()
        .map(|(i, s)| (overlap_score(&s, query), i, s))
        .collect();

    // Descending by score; stable on the original index for equal scores.
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    let mut kept: Vec<Source> = Vec::new();
    for (_, _, candidate) in scored {
        let duplicate = kept
            .iter()
            .any(|k| jaccard_similarity(k, &candidate) > dedup_threshold);
        if !duplicate {
            kept.push(candidate);
        }
        if kept.len() == max_k {
            break;
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, excerpt: &str) -> Source {
        Source::new(title, format!("https://example.com/{}", title.replace(' ', "-")))
            .with_excerpt(excerpt)
    }

    #[test]
    fn test_overlap_score_counts_significant_tokens() {
        let s = source(
            "Premarital agreements",
            "Enforceability of premarital agreements under the Family Code",
        );
        // Significant query tokens: "premarital", "agreement" (no match:
        // excerpt has plural), "enforceability", "family".
        let score = overlap_score(&s, "premarital agreements enforceability");
        assert!((score - 1.0).abs() < f64::EPSILON);

        let score = overlap_score(&s, "premarital agreements spousal support");
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overlap_score_ignores_short_tokens() {
        let s = source("Statute of limitations", "two years for personal injury");
        // "of" and "is" are too short to count.
        let score = overlap_score(&s, "of is limitations");
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jaccard_identical_is_one() {
        let a = source("Same title", "same excerpt text");
        let b = source("Same title", "same excerpt text");
        assert!((jaccard_similarity(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jaccard_disjoint_is_zero() {
        let a = source("alpha beta", "gamma");
        let b = source("delta epsilon", "zeta");
        assert_eq!(jaccard_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_prune_truncates_to_max_k() {
        let sources: Vec<Source> = (0..10)
            .map(|i| source(&format!("unique{i} topic{i}"), &format!("body{i}")))
            .collect();
        let kept = prune(sources, "anything", 3, 0.8);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_prune_drops_near_duplicates_keeping_higher_scored() {
        let better = source(
            "Family Code 1615 enforceability",
            "premarital agreement voluntariness unconscionability independent counsel seven day waiting standard",
        );
        let worse = source(
            "Family Code 1615 enforceability",
            "premarital agreement voluntariness unconscionability independent counsel seven day waiting rules",
        );
        let unrelated = source("Penal Code 187", "murder definition malice aforethought");

        let kept = prune(
            vec![worse.clone(), better.clone(), unrelated.clone()],
            "premarital agreement enforceability standard",
            3,
            0.8,
        );
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|s| s.excerpt == better.excerpt));
        assert!(!kept.iter().any(|s| s.excerpt == worse.excerpt));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let sources = vec![
            source("Premarital agreements", "enforceability standards"),
            source("Spousal support", "duration and modification"),
            source("Community property", "division at dissolution"),
            source("Premarital agreements", "enforceability standards"),
        ];
        let query = "premarital agreement enforceability";
        let once = prune(sources.clone(), query, 3, 0.8);
        let twice = prune(once.clone(), query, 3, 0.8);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_prune_order_independent_top_k() {
        let a = source("Premarital agreements", "enforceability standards for couples");
        let b = source("Spousal support", "modification of support agreement duration");
        let c = source("Community property", "division at dissolution of marriage");
        let query = "premarital agreement enforceability";

        let forward = prune(vec![a.clone(), b.clone(), c.clone()], query, 2, 0.8);
        let reversed = prune(vec![c, b, a], query, 2, 0.8);
        let forward_urls: HashSet<&str> = forward.iter().map(|s| s.url.as_str()).collect();
        let reversed_urls: HashSet<&str> = reversed.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(forward_urls, reversed_urls);
    }

    #[test]
    fn test_dedup_invariant_no_pair_above_threshold() {
        let sources = vec![
            source("title one shared words here", "alpha beta gamma delta"),
            source("title one shared words here", "alpha beta gamma delta"),
            source("title one shared words here", "alpha beta gamma epsilon"),
            source("other thing", "completely different content"),
        ];
        let kept = prune(sources, "shared words", 10, 0.8);
        for i in 0..kept.len() {
            for j in (i + 1)..kept.len() {
                assert!(
                    jaccard_similarity(&kept[i], &kept[j]) <= 0.8,
                    "near-duplicate pair survived pruning"
                );
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_prune_never_exceeds_max_k(
            titles in proptest::collection::vec("[a-z]{3,8} [a-z]{3,8}", 0..12),
            max_k in 1usize..5,
        ) {
            let sources: Vec<Source> = titles
                .iter()
                .enumerate()
                .map(|(i, t)| Source::new(t.clone(), format!("https://example.com/{i}")))
                .collect();
            let kept = prune(sources, "query words", max_k, 0.8);
            proptest::prop_assert!(kept.len() <= max_k);
        }

        #[test]
        fn prop_prune_idempotent(
            titles in proptest::collection::vec("[a-z]{3,8} [a-z]{3,8} [a-z]{3,8}", 0..10),
        ) {
            let sources: Vec<Source> = titles
                .iter()
                .enumerate()
                .map(|(i, t)| Source::new(t.clone(), format!("https://example.com/{i}")))
                .collect();
            let once = prune(sources, "some query", 3, 0.8);
            let twice = prune(once.clone(), "some query", 3, 0.8);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
