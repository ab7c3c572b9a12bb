//! Citation pattern extraction.
//!
//! Two independent passes over the input text: the canonical code-citation
//! pattern (optional jurisdiction prefix, code name, optional section
//! marker, numeric section with optional decimal sub-section, optional
//! parenthesized sub-part), and the case-citation patterns ("Party v.
//! Party", "In re X", "Estate/Matter/Marriage/Conservatorship/Guardianship
//! of X"), each optionally followed by a reporter citation and/or a year.
//! A citation seen once is not re-emitted.

use crate::citations::registry::{CALIFORNIA_REPORTERS, CODE_REGISTRY, FEDERAL_REPORTERS};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// A statutory code citation.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeCitation {
    pub raw: String,
    pub code_name: String,
    pub section: String,
    pub subpart: Option<String>,
}

/// A volume/reporter/page triple.
#[derive(Debug, Clone, PartialEq)]
pub struct ReporterCite {
    pub volume: u32,
    pub reporter: String,
    pub page: u32,
}

/// A case-law citation.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseCitation {
    pub raw: String,
    pub case_name: String,
    pub reporter: Option<ReporterCite>,
    pub year: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Citation {
    Code(CodeCitation),
    Case(CaseCitation),
}

impl Citation {
    pub fn raw(&self) -> &str {
        match self {
            Citation::Code(c) => &c.raw,
            Citation::Case(c) => &c.raw,
        }
    }
}

fn escaped_alternation(items: impl Iterator<Item = &'static str>) -> String {
    items
        .map(|n| regex::escape(n).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

static CODE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    // Longest spelling first so "Code of Civil Procedure" is preferred
    // over any shorter overlapping alternative.
    let mut names: Vec<&'static str> = CODE_REGISTRY
        .iter()
        .flat_map(|e| e.names.iter().copied())
        .collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    let pattern = format!(
        r"(?i)\b(?:(?:California|Cal\.)\s+)?({})\s*(?:§§?|sections?|secs?\.?)?\s*(\d+(?:\.\d+)?)(?:\s*\(([A-Za-z0-9]{{1,3}})\))?",
        escaped_alternation(names.into_iter()),
    );
    Regex::new(&pattern).expect("code citation pattern must compile")
});

static CASE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    let reporters = escaped_alternation(
        CALIFORNIA_REPORTERS
            .iter()
            .chain(FEDERAL_REPORTERS.iter())
            .copied(),
    );
    // A party: a capitalized word optionally followed by a few more words
    // (connectives allowed mid-name).
    let party = r"[A-Z][A-Za-z'\-]*\.?(?:\s+(?:of|the|&|[A-Z][A-Za-z'\-]*\.?)){0,4}";
    let in_re = r"(?:In\s+re(?:\s+(?:Marriage|Estate|Conservatorship|Guardianship)\s+of)?|Estate\s+of|Matter\s+of|Marriage\s+of|Conservatorship\s+of|Guardianship\s+of)\s+[A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]*)*";
    let pattern = format!(
        r"\b({in_re}|{party}\s+v\.\s+{party})(?:\s*\((\d{{4}})\))?(?:[,\s]\s*(\d+)\s+({reporters})\s+(\d+))?(?:\s*\((\d{{4}})\))?",
    );
    Regex::new(&pattern).expect("case citation pattern must compile")
});

fn normalize_citation(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentence-leading words that get swept into a "Party v. Party" match
/// because the pattern cannot look behind.
const NAME_STOPWORDS: &[&str] = &[
    "In", "The", "See", "At", "On", "As", "And", "But", "Under", "Compare", "Accord", "Per",
];

fn trim_leading_stopwords(name: &str) -> String {
    let mut words: Vec<&str> = name.split_whitespace().collect();
    while words.len() > 1 && NAME_STOPWORDS.contains(&words[0]) {
        // "In re ..." is a real case-name prefix, not a sentence lead-in.
        if words[0] == "In" && words.get(1) == Some(&"re") {
            break;
        }
        words.remove(0);
    }
    words.join(" ")
}

/// Extract every distinct citation from free text.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for caps in CODE_CITATION.captures_iter(text) {
        let raw = caps.get(0).unwrap().as_str().trim().to_string();
        if !seen.insert(normalize_citation(&raw)) {
            continue;
        }
        citations.push(Citation::Code(CodeCitation {
            raw,
            code_name: caps[1].to_string(),
            section: caps[2].to_string(),
            subpart: caps.get(3).map(|m| m.as_str().to_string()),
        }));
    }

    for caps in CASE_CITATION.captures_iter(text) {
        let raw = caps.get(0).unwrap().as_str().trim().to_string();
        if !seen.insert(normalize_citation(&raw)) {
            continue;
        }
        let reporter = match (caps.get(3), caps.get(4), caps.get(5)) {
            (Some(volume), Some(reporter), Some(page)) => Some(ReporterCite {
                volume: volume.as_str().parse().unwrap_or(0),
                reporter: reporter.as_str().to_string(),
                page: page.as_str().parse().unwrap_or(0),
            }),
            _ => None,
        };
        let year = caps
            .get(2)
            .or(caps.get(6))
            .and_then(|m| m.as_str().parse().ok());
        citations.push(Citation::Case(CaseCitation {
            raw,
            case_name: trim_leading_stopwords(caps[1].trim()),
            reporter,
            year,
        }));
    }

    citations
}
