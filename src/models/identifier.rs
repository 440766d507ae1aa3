//! Article identifier classification.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::sources::SourceError;

/// A bare article identifier in one of the schemes the literature service indexes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ArticleId {
    /// PubMed identifier, e.g. `35468954`
    Pmid(String),
    /// PubMed Central identifier, e.g. `PMC9276953` (version suffix allowed)
    Pmcid(String),
    /// Digital object identifier without resolver prefix, e.g. `10.1038/s41587-022-01278-2`
    Doi(String),
}

fn pmcid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^PMC\d+(?:\.\d+)?$").expect("valid PMCID pattern"))
}

fn doi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^10\.\d+/\S+").expect("valid DOI pattern"))
}

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

impl ArticleId {
    /// Classify a raw identifier string
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SourceError::InvalidInput(
                "article identifier must not be empty".to_string(),
            ));
        }

        let upper = trimmed.to_ascii_uppercase();
        if pmcid_pattern().is_match(&upper) {
            return Ok(ArticleId::Pmcid(upper));
        }

        let mut doi = trimmed;
        for prefix in DOI_PREFIXES {
            if doi.len() >= prefix.len() && doi[..prefix.len()].eq_ignore_ascii_case(prefix) {
                doi = doi[prefix.len()..].trim_start();
                break;
            }
        }
        if doi_pattern().is_match(doi) {
            return Ok(ArticleId::Doi(doi.to_string()));
        }

        if is_pmid(trimmed) {
            return Ok(ArticleId::Pmid(trimmed.to_string()));
        }

        Err(SourceError::InvalidInput(format!(
            "'{}' is not a PMID, PMCID or DOI",
            trimmed
        )))
    }

    pub fn value(&self) -> &str {
        match self {
            ArticleId::Pmid(v) | ArticleId::Pmcid(v) | ArticleId::Doi(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArticleId::Pmid(_) => "pmid",
            ArticleId::Pmcid(_) => "pmcid",
            ArticleId::Doi(_) => "doi",
        }
    }
}

/// All digits, no leading zero unless the whole id is a single digit
fn is_pmid(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s.len() == 1 || !s.starts_with('0'))
}

impl FromStr for ArticleId {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pmcid() {
        assert_eq!(
            ArticleId::parse("PMC9276953").unwrap(),
            ArticleId::Pmcid("PMC9276953".to_string())
        );
        assert_eq!(
            ArticleId::parse("pmc123.2").unwrap(),
            ArticleId::Pmcid("PMC123.2".to_string())
        );
    }

    #[test]
    fn test_parse_doi_with_prefixes() {
        let expected = ArticleId::Doi("10.1038/s41587-022-01278-2".to_string());
        assert_eq!(ArticleId::parse("10.1038/s41587-022-01278-2").unwrap(), expected);
        assert_eq!(ArticleId::parse("doi:10.1038/s41587-022-01278-2").unwrap(), expected);
        assert_eq!(
            ArticleId::parse("https://doi.org/10.1038/s41587-022-01278-2").unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_pmid() {
        assert_eq!(
            ArticleId::parse(" 35468954 ").unwrap(),
            ArticleId::Pmid("35468954".to_string())
        );
        assert_eq!(ArticleId::parse("0").unwrap(), ArticleId::Pmid("0".to_string()));
        assert!(ArticleId::parse("0123").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "   ", "mCherry", "PMC", "10.x/abc", "12a"] {
            assert!(
                matches!(ArticleId::parse(raw), Err(SourceError::InvalidInput(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
