//! Static registries of California code names and case-reporter
//! abbreviations.
//!
//! The code table maps every accepted spelling of a code name to the
//! `lawCode` identifier used by the legislature's public code browser.

/// One California code with its accepted spellings.
pub struct CodeEntry {
    /// Identifier used in constructed leginfo URLs.
    pub law_code: &'static str,
    /// Accepted spellings, longest first where prefixes overlap.
    pub names: &'static [&'static str],
}

pub static CODE_REGISTRY: &[CodeEntry] = &[
    CodeEntry {
        law_code: "BPC",
        names: &["Business and Professions Code", "Bus. & Prof. Code"],
    },
    CodeEntry {
        law_code: "CCP",
        names: &["Code of Civil Procedure", "Civ. Proc. Code"],
    },
    CodeEntry {
        law_code: "CIV",
        names: &["Civil Code", "Civ. Code"],
    },
    CodeEntry {
        law_code: "CORP",
        names: &["Corporations Code", "Corp. Code"],
    },
    CodeEntry {
        law_code: "EDC",
        names: &["Education Code", "Ed. Code"],
    },
    CodeEntry {
        law_code: "EVID",
        names: &["Evidence Code", "Evid. Code"],
    },
    CodeEntry {
        law_code: "FAM",
        names: &["Family Code", "Fam. Code"],
    },
    CodeEntry {
        law_code: "GOV",
        names: &["Government Code", "Gov. Code", "Gov't Code"],
    },
    CodeEntry {
        law_code: "HSC",
        names: &["Health and Safety Code", "Health & Safety Code", "Health & Saf. Code"],
    },
    CodeEntry {
        law_code: "INS",
        names: &["Insurance Code", "Ins. Code"],
    },
    CodeEntry {
        law_code: "LAB",
        names: &["Labor Code", "Lab. Code"],
    },
    CodeEntry {
        law_code: "PEN",
        names: &["Penal Code", "Pen. Code"],
    },
    CodeEntry {
        law_code: "PROB",
        names: &["Probate Code", "Prob. Code"],
    },
    CodeEntry {
        law_code: "PUC",
        names: &["Public Utilities Code", "Pub. Util. Code"],
    },
    CodeEntry {
        law_code: "RTC",
        names: &["Revenue and Taxation Code", "Rev. & Tax. Code"],
    },
    CodeEntry {
        law_code: "UIC",
        names: &["Unemployment Insurance Code", "Unemp. Ins. Code"],
    },
    CodeEntry {
        law_code: "VEH",
        names: &["Vehicle Code", "Veh. Code"],
    },
    CodeEntry {
        law_code: "WAT",
        names: &["Water Code", "Wat. Code"],
    },
    CodeEntry {
        law_code: "WIC",
        names: &["Welfare and Institutions Code", "Welf. & Inst. Code"],
    },
];

/// Look up the `lawCode` identifier for a code name spelling.
/// Matching is case-insensitive and tolerant of collapsed whitespace.
pub fn law_code_for(name: &str) -> Option<&'static str> {
    let normalized = normalize_name(name);
    CODE_REGISTRY.iter().find_map(|entry| {
        entry
            .names
            .iter()
            .any(|n| normalize_name(n) == normalized)
            .then_some(entry.law_code)
    })
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// California reporter abbreviations, ordered longest-first so that the
/// extraction regex prefers the most specific alternative.
pub static CALIFORNIA_REPORTERS: &[&str] = &[
    "Cal.App.5th",
    "Cal.App.4th",
    "Cal.App.3d",
    "Cal.App.2d",
    "Cal.App.",
    "Cal.Rptr.3d",
    "Cal.Rptr.2d",
    "Cal.Rptr.",
    "Cal.5th",
    "Cal.4th",
    "Cal.3d",
    "Cal.2d",
    "Cal.",
    "P.3d",
    "P.2d",
];

/// Federal reporter abbreviations — out of jurisdiction for this assistant.
pub static FEDERAL_REPORTERS: &[&str] = &[
    "F.Supp.3d",
    "F.Supp.2d",
    "F.Supp.",
    "F.4th",
    "F.3d",
    "F.2d",
    "S.Ct.",
    "S. Ct.",
    "L.Ed.2d",
    "L.Ed.",
    "U.S.",
];
