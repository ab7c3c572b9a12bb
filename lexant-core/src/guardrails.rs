//! Deterministic post-gating guardrails.
//!
//! Three independent checks run after the confidence gate: entity
//! containment, citation-marker existence, and jurisdiction compliance.
//! Errors mark the report blocked; once a status has been gated the
//! checks are advisory and append a visible warning rather than
//! retracting the status.

use crate::citations::extract::{Citation, extract_citations};
use crate::citations::registry::FEDERAL_REPORTERS;
use crate::types::{GuardrailReport, Source};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[\d,]+(?:\.\d{2})?").expect("dollar pattern must compile"));

static TIME_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s+(?:days?|years?|months?)\b").expect("period pattern must compile")
});

static NUMERIC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("marker pattern must compile"));

static ID_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[id:([^\]]+)\]").expect("id marker pattern must compile"));

static FEDERAL_CITE: LazyLock<Regex> = LazyLock::new(|| {
    let reporters = FEDERAL_REPORTERS
        .iter()
        .map(|r| regex::escape(r))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b\d+\s+(?:{reporters})\s+\d+")).expect("federal pattern must compile")
});

static FEDERAL_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfederal\b|\bu\.s\.\s+law\b|\bninth\s+circuit\b|\bunited\s+states\b|\bout[-\s]of[-\s]state\b|\banother\s+state\b")
        .expect("federal question pattern must compile")
});

fn source_haystack(sources: &[Source]) -> String {
    sources
        .iter()
        .map(|s| s.match_text())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Entity containment: case names, statute citations, and dollar amounts
/// appearing in the answer must appear in the source excerpts (errors);
/// time periods are checked too, but paraphrase makes them weaker, so an
/// absence is only a warning.
pub fn check_entity_containment(answer: &str, sources: &[Source]) -> GuardrailReport {
    let haystack = source_haystack(sources);
    let mut report = GuardrailReport::passing();

    for citation in extract_citations(answer) {
        match citation {
            Citation::Case(case) => {
                if !haystack.contains(&case.case_name.to_lowercase()) {
                    report.errors.push(format!(
                        "case name not found in sources: {}",
                        case.case_name
                    ));
                }
            }
            Citation::Code(code) => {
                // Partial match: the code name and the bare section number
                // each have to appear somewhere in the sources.
                let code_present = haystack.contains(&code.code_name.to_lowercase());
                let section_present = haystack.contains(&code.section);
                if !(code_present && section_present) {
                    report.errors.push(format!(
                        "statute citation not found in sources: {} § {}",
                        code.code_name, code.section
                    ));
                }
            }
        }
    }

    for amount in DOLLAR_AMOUNT.find_iter(answer) {
        if !haystack.contains(&amount.as_str().to_lowercase()) {
            report
                .errors
                .push(format!("dollar amount not found in sources: {}", amount.as_str()));
        }
    }

    for period in TIME_PERIOD.find_iter(answer) {
        if !haystack.contains(&period.as_str().to_lowercase()) {
            report
                .warnings
                .push(format!("time period not found in sources: {}", period.as_str()));
        }
    }

    report.passed = report.errors.is_empty();
    report.blocked = !report.errors.is_empty();
    report
}

/// Citation existence: every `[n]` marker must index an existing source at
/// that 1-based position, and every `[id:x]` marker must match a known id.
pub fn check_citation_existence(answer: &str, sources: &[Source]) -> GuardrailReport {
    let known_ids: HashSet<usize> = sources.iter().filter_map(|s| s.id).collect();
    let mut report = GuardrailReport::passing();

    for caps in NUMERIC_MARKER.captures_iter(answer) {
        let n: usize = caps[1].parse().unwrap_or(0);
        if n == 0 || n > sources.len() {
            report
                .errors
                .push(format!("citation marker [{n}] does not match any source"));
        }
    }

    for caps in ID_MARKER.captures_iter(answer) {
        let id = caps[1].trim();
        let matches = id
            .parse::<usize>()
            .map(|id| known_ids.contains(&id))
            .unwrap_or(false);
        if !matches {
            report
                .errors
                .push(format!("citation marker [id:{id}] does not match any source"));
        }
    }

    report.passed = report.errors.is_empty();
    report.blocked = !report.errors.is_empty();
    report
}

/// Jurisdiction compliance: federal reporter citations are errors unless
/// the question explicitly asked about federal or out-of-state law.
pub fn check_jurisdiction(answer: &str, question: &str) -> GuardrailReport {
    let mut report = GuardrailReport::passing();
    if FEDERAL_QUESTION.is_match(question) {
        return report;
    }

    for cite in FEDERAL_CITE.find_iter(answer) {
        report.errors.push(format!(
            "out-of-jurisdiction reporter citation: {}",
            cite.as_str()
        ));
    }

    report.passed = report.errors.is_empty();
    report.blocked = !report.errors.is_empty();
    report
}

/// Run all three guardrail checks and fold the results.
pub fn run_guardrails(answer: &str, question: &str, sources: &[Source]) -> GuardrailReport {
    let mut report = GuardrailReport::passing();
    report.merge(check_entity_containment(answer, sources));
    report.merge(check_citation_existence(answer, sources));
    report.merge(check_jurisdiction(answer, question));
    report
}

/// The visible warning suffix appended to an answer whose guardrails
/// reported errors or warnings.
pub fn warning_suffix(report: &GuardrailReport) -> Option<String> {
    if report.errors.is_empty() && report.warnings.is_empty() {
        return None;
    }
    let mut lines = vec!["Caution: automated checks flagged this answer:".to_string()];
    for error in &report.errors {
        lines.push(format!("- {error}"));
    }
    for warning in &report.warnings {
        lines.push(format!("- {warning}"));
    }
    Some(lines.join("\n"))
}
