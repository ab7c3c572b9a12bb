//! Confidence gating — the pure function that converts a verification
//! report into a user-facing trust status.
//!
//! The coverage threshold is context-sensitive: verbatim bill text and
//! live web grounding are treated as inherently stronger evidence, so
//! they lower the bar for showing a partially verified answer.

use crate::config::VerificationConfig;
use crate::types::{VerificationReport, VerificationStatus};

/// The gate's decision for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub status: VerificationStatus,
    /// Whether the generated answer may be shown. On refusal the caveat
    /// replaces the answer text entirely.
    pub should_show: bool,
    pub caveat: Option<String>,
}

fn threshold(config: &VerificationConfig, has_bill_text: bool, has_grounding: bool) -> f64 {
    if has_grounding {
        config.grounding_threshold
    } else if has_bill_text {
        config.bill_text_threshold
    } else {
        config.base_threshold
    }
}

fn evidence_basis(has_bill_text: bool, has_grounding: bool) -> &'static str {
    if has_grounding {
        "current web results"
    } else if has_bill_text {
        "the full bill text"
    } else {
        "the retrieved sources"
    }
}

/// Map a verification report and context flags to a final trust status.
///
/// Rules, in order: full coverage with support and no ambiguity is
/// verified; coverage at or above the context threshold is partially
/// verified with a caveat; low coverage or ambiguity is a refusal; the
/// remaining fallback is unverified with a generic caveat.
pub fn gate(
    report: &VerificationReport,
    config: &VerificationConfig,
    has_bill_text: bool,
    has_grounding: bool,
) -> GateOutcome {
    let threshold = threshold(config, has_bill_text, has_grounding);

    if report.coverage >= 1.0 && report.min_support >= 1 && !report.ambiguity {
        return GateOutcome {
            status: VerificationStatus::Verified,
            should_show: true,
            caveat: None,
        };
    }

    if report.coverage >= threshold && report.coverage < 1.0 {
        let unsupported = report.unsupported_claims.len();
        let caveat = format!(
            "{unsupported} statement{} in this answer could not be confirmed against \
             {}. The confirmed portions are shown; please verify the rest independently.",
            if unsupported == 1 { "" } else { "s" },
            evidence_basis(has_bill_text, has_grounding),
        );
        return GateOutcome {
            status: VerificationStatus::PartiallyVerified,
            should_show: true,
            caveat: Some(caveat),
        };
    }

    if report.coverage < threshold || report.ambiguity {
        let reason = if report.ambiguity {
            "the retrieved sources conflict with one another on this question"
        } else {
            "too little of the drafted answer could be confirmed against the retrieved sources"
        };
        return GateOutcome {
            status: VerificationStatus::Refusal,
            should_show: false,
            caveat: Some(format!(
                "I can't give a reliable answer here: {reason}. For a question like this, \
                 please consult a licensed California attorney.",
            )),
        };
    }

    GateOutcome {
        status: VerificationStatus::Unverified,
        should_show: true,
        caveat: Some(
            "This answer could not be verified against the retrieved sources; treat it \
             as a starting point only."
                .to_string(),
        ),
    }
}
