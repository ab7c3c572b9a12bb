//! Citation extraction and resolution.
//!
//! Scans free text for statutory and case-law citation patterns and
//! resolves them to canonical reference sources. Detection is data-driven
//! from the static registry so the logic is a pure function of
//! (text, registry) and unit-testable without network access.

pub mod extract;
pub mod registry;
pub mod resolve;

pub use extract::{Citation, ReporterCite, extract_citations};
pub use resolve::{CitationResolver, resolve_code_citation};
