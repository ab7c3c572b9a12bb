//! Claim extraction — split an answer into sentences and flag the subset
//! that constitute checkable legal claims.
//!
//! Sentence splitting protects common legal abbreviations ("Cal.", "App.",
//! "v.") from being treated as sentence boundaries. A sentence becomes a
//! claim iff it matches at least one claim-indicator pattern; duplicate
//! claims are suppressed by normalized leading substring.

use crate::citations::registry::CODE_REGISTRY;
use crate::types::{Claim, ClaimKind, Source};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Abbreviations protected during sentence splitting, longest first so
/// that compound forms are protected before their prefixes.
const PROTECTED_ABBREVIATIONS: &[&str] = &[
    "Cal.App.", "Cal.Rptr.", "F.Supp.", "S.Ct.", "U.S.", "Cal.", "App.", "Bus.", "Civ.",
    "Corp.", "Evid.", "Fam.", "Gov.", "Inc.", "Ins.", "Inst.", "Lab.", "Ltd.", "No.",
    "Pen.", "Prob.", "Proc.", "Prof.", "Rev.", "Sec.", "Stats.", "Tax.", "Veh.", "Welf.",
    "vs.", "v.",
];

const DOT_SENTINEL: char = '\u{1}';

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("sentence pattern must compile"));

fn protect(text: &str) -> String {
    let mut out = text.to_string();
    for abbr in PROTECTED_ABBREVIATIONS {
        out = out.replace(abbr, &abbr.replace('.', &DOT_SENTINEL.to_string()));
    }
    out
}

fn restore(text: &str) -> String {
    text.replace(DOT_SENTINEL, ".")
}

/// Split text into sentences, restoring protected abbreviations.
pub fn split_sentences(text: &str) -> Vec<String> {
    let protected = protect(text);
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(&protected) {
        let sentence = protected[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(restore(sentence));
        }
        start = m.end();
    }
    if start < protected.len() {
        let tail = protected[start..].trim();
        if !tail.is_empty() {
            sentences.push(restore(tail));
        }
    }
    sentences
}

fn code_name_alternation() -> String {
    CODE_REGISTRY
        .iter()
        .flat_map(|e| e.names.iter())
        .map(|n| regex::escape(n).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

static CODE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)§|\bsections?\s+\d|\b(?:{})\b",
        code_name_alternation()
    ))
    .expect("code mention pattern must compile")
});

static ADJUDICATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:held|ruled|decided|found)\b|\bv\.\s|\bIn\s+re\b")
        .expect("adjudicative pattern must compile")
});

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]|\[id:([^\]]+)\]").expect("marker pattern must compile"));

/// The claim-indicator table: a sentence matching any of these patterns is
/// treated as a checkable claim.
static CLAIM_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let patterns = [
        // Modal / obligation verbs.
        r"(?i)\b(?:must|shall|required|requires|mandates?|prohibits?)\b",
        // Numeric deadlines and time periods.
        r"(?i)\bwithin\s+\d+\b|\b\d+\s+(?:day|year|month)s?\b",
        // Adjudicative verbs.
        r"(?i)\b(?:held|ruled|decided|found)\b",
        // Attribution phrases.
        r"(?i)\bunder\s+california\s+law\b|\bpursuant\s+to\b",
        // Definitional verbs.
        r"(?i)\bis\s+defined\s+as\b|\bmeans\b|\bincludes\b|\bexcludes\b",
        // Penalty vocabulary.
        r"(?i)\b(?:penalty|penalties|fines?|fined|imprisonment|damages)\b",
        // Standard-of-proof vocabulary.
        r"(?i)\b(?:preponderance\s+of\s+the\s+evidence|clear\s+and\s+convincing|beyond\s+a\s+reasonable\s+doubt|burden\s+of\s+proof)\b",
    ];
    let mut compiled: Vec<Regex> = patterns
        .iter()
        .map(|p| Regex::new(p).expect("claim indicator must compile"))
        .collect();
    // Section-marker / code-name mentions and inline citation markers
    // count as indicators too.
    compiled.push(CODE_MENTION.clone());
    compiled.push(CITATION_MARKER.clone());
    compiled
});

fn is_claim(sentence: &str) -> bool {
    CLAIM_INDICATORS.iter().any(|p| p.is_match(sentence))
}

fn classify(sentence: &str) -> ClaimKind {
    if CODE_MENTION.is_match(sentence) {
        ClaimKind::Statute
    } else if ADJUDICATIVE.is_match(sentence) {
        ClaimKind::Case
    } else {
        ClaimKind::Fact
    }
}

/// Inline citation ids referenced by a sentence, limited to ids that
/// exist in the source list (all markers when the list is empty).
fn cited_ids(sentence: &str, sources: &[Source]) -> Vec<usize> {
    let known: HashSet<usize> = sources.iter().filter_map(|s| s.id).collect();
    let mut ids = Vec::new();
    for caps in CITATION_MARKER.captures_iter(sentence) {
        let id = caps
            .get(1)
            .or(caps.get(2))
            .and_then(|m| m.as_str().parse::<usize>().ok());
        if let Some(id) = id {
            if (known.is_empty() || known.contains(&id)) && !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Leading-substring key used for duplicate suppression.
fn dedup_key(sentence: &str) -> String {
    let normalized = sentence
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    normalized.chars().take(60).collect()
}

/// Extract the checkable claims from a generated answer.
pub fn extract_claims(answer: &str, sources: &[Source]) -> Vec<Claim> {
    let mut claims = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for sentence in split_sentences(answer) {
        if !is_claim(&sentence) {
            continue;
        }
        if !seen.insert(dedup_key(&sentence)) {
            continue;
        }
        claims.push(Claim {
            cites: cited_ids(&sentence, sources),
            kind: classify(&sentence),
            text: sentence,
        });
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_protects_legal_abbreviations() {
        let sentences = split_sentences(
            "The court in Marvin v. Marvin (1976) 18 Cal.3d 660 recognized such claims. \
             A later case narrowed them.",
        );
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("Marvin v. Marvin"));
        assert!(sentences[0].contains("Cal.3d 660"));
    }

    #[test]
    fn test_split_protects_citation_abbreviations() {
        let sentences =
            split_sentences("See Cal. Fam. Code § 1615. The statute lists the grounds.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "See Cal. Fam. Code § 1615.");
    }

    #[test]
    fn test_split_handles_unterminated_tail() {
        let sentences = split_sentences("First sentence. Second without a period");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1], "Second without a period");
    }

    #[test]
    fn test_modal_sentence_is_claim() {
        let claims = extract_claims("A premarital agreement must be in writing.", &[]);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].kind, ClaimKind::Fact);
    }

    #[test]
    fn test_deadline_sentence_is_claim() {
        let claims = extract_claims(
            "The petition has to be filed within 30 days of service.",
            &[],
        );
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_statute_kind_classification() {
        let claims = extract_claims(
            "Family Code § 1615 lists the grounds for unenforceability.",
            &[],
        );
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].kind, ClaimKind::Statute);
    }

    #[test]
    fn test_case_kind_classification() {
        let claims = extract_claims("The court held that the agreement was voluntary.", &[]);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].kind, ClaimKind::Case);
    }

    #[test]
    fn test_statute_kind_wins_over_case_kind() {
        let claims = extract_claims(
            "The court held that Family Code § 1615 requires voluntariness.",
            &[],
        );
        assert_eq!(claims[0].kind, ClaimKind::Statute);
    }

    #[test]
    fn test_non_claim_sentences_skipped() {
        let claims = extract_claims(
            "I hope this helps. Feel free to ask about anything else.",
            &[],
        );
        assert!(claims.is_empty());
    }

    #[test]
    fn test_inline_markers_recorded() {
        let mut sources = vec![
            Source::new("A", "https://a.example.com"),
            Source::new("B", "https://b.example.com"),
        ];
        crate::types::number_sources(&mut sources);
        let claims = extract_claims(
            "A premarital agreement must be in writing [1][2].",
            &sources,
        );
        assert_eq!(claims[0].cites, vec![1, 2]);
    }

    #[test]
    fn test_marker_for_unknown_source_dropped() {
        let mut sources = vec![Source::new("A", "https://a.example.com")];
        crate::types::number_sources(&mut sources);
        let claims = extract_claims("The statute requires notice [7].", &sources);
        assert_eq!(claims.len(), 1);
        assert!(claims[0].cites.is_empty());
    }

    #[test]
    fn test_duplicate_claims_suppressed() {
        let text = "The fee must be paid within 10 days. The fee must be paid within 10 days.";
        let claims = extract_claims(text, &[]);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_citation_marker_alone_makes_claim() {
        let claims = extract_claims("This view is widely endorsed [1].", &[]);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_proof_standard_is_claim() {
        let claims = extract_claims(
            "Fraud is proven by clear and convincing evidence in these actions.",
            &[],
        );
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_penalty_vocabulary_is_claim() {
        let claims = extract_claims(
            "Violations carry a fine and possible imprisonment in county jail.",
            &[],
        );
        assert_eq!(claims.len(), 1);
    }
}
