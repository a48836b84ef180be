//! Publication and dataset identifier parsing.
//!
//! DOIs are kept unescaped in memory and storage. On disk a `/` inside a DOI
//! is written as `_slash`, and identifiers typed by users may come in either
//! form.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::compile_static_regex;

/// Token substituted for `/` in DOI-derived file names.
pub const SLASH_ESCAPE: &str = "_slash";

static NUMERIC_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^\d+$"));

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^\d+(?:\.\d+)+/[\w\-.;:()<>\[\]/]+$"));

/// A user-supplied publication identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationId {
    /// DOI, unescaped.
    Doi(String),
    /// Numeric `PubMed` id.
    ExternalId(String),
}

impl PublicationId {
    /// Parses a DOI (optionally `_slash`-escaped) or a numeric PMID.
    ///
    /// Returns `None` when the input is neither.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if NUMERIC_ID_RE.is_match(trimmed) {
            return Some(Self::ExternalId(trimmed.to_string()));
        }
        let doi = unescape_doi(trimmed);
        DOI_RE.is_match(&doi).then_some(Self::Doi(doi))
    }
}

/// Returns true for a numeric dataset uid.
#[must_use]
pub fn is_dataset_id(value: &str) -> bool {
    NUMERIC_ID_RE.is_match(value)
}

/// Replaces every `/` in `doi` with the file-name escape.
#[must_use]
pub fn escape_doi(doi: &str) -> String {
    doi.replace('/', SLASH_ESCAPE)
}

/// Reverses [`escape_doi`].
#[must_use]
pub fn unescape_doi(value: &str) -> String {
    value.replace(SLASH_ESCAPE, "/")
}

/// Canonical stored file name for a publication's PDF.
#[must_use]
pub fn pdf_file_name(doi: &str) -> String {
    format!("{}.pdf", escape_doi(doi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_external_id() {
        assert_eq!(
            PublicationId::parse(" 23390130 "),
            Some(PublicationId::ExternalId("23390130".to_string()))
        );
    }

    #[test]
    fn test_parse_plain_and_escaped_doi() {
        let expected = Some(PublicationId::Doi("10.1093/hmg/ddt076".to_string()));
        assert_eq!(PublicationId::parse("10.1093/hmg/ddt076"), expected);
        assert_eq!(PublicationId::parse("10.1093_slashhmg_slashddt076"), expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(PublicationId::parse("not-an-id"), None);
        assert_eq!(PublicationId::parse(""), None);
        assert_eq!(PublicationId::parse("10.1093"), None);
    }

    #[test]
    fn test_pdf_file_name_escapes_every_slash() {
        assert_eq!(
            pdf_file_name("10.1093/hmg/ddt076"),
            "10.1093_slashhmg_slashddt076.pdf"
        );
        assert_eq!(unescape_doi(&escape_doi("10.1/a/b")), "10.1/a/b");
    }

    #[test]
    fn test_is_dataset_id() {
        assert!(is_dataset_id("200011474"));
        assert!(!is_dataset_id("GSE1234"));
        assert!(!is_dataset_id(""));
    }
}
