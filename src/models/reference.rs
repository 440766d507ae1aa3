//! Bibliographic reference models produced by search and consumed by ranking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// What a search record says is retrievable for an article
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Availability: u32 {
        /// Full text is hosted by the search service (structured markup)
        const FULL_TEXT = 1 << 0;
        /// Section-level structure of the body is retrievable
        const TABLE_OF_CONTENTS = 1 << 1;
        /// Article is published open access
        const OPEN_ACCESS = 1 << 2;
        /// A PDF rendition exists somewhere
        const PDF = 1 << 3;
    }
}

/// A bibliographic record identifying a published article.
///
/// Built once from a search response and never mutated afterwards; fields are
/// private and exposed through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleReference {
    id: String,
    title: String,
    authors: Vec<String>,
    venue: Option<String>,
    published: Option<NaiveDate>,
    availability: Availability,
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    abstract_text: Option<String>,
    keywords: Vec<String>,
}

impl ArticleReference {
    /// Unique external identifier (e.g. `MED:35468954`)
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Author names in publication order
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn venue(&self) -> Option<&str> {
        self.venue.as_deref()
    }

    pub fn published(&self) -> Option<NaiveDate> {
        self.published
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn pmid(&self) -> Option<&str> {
        self.pmid.as_deref()
    }

    pub fn pmcid(&self) -> Option<&str> {
        self.pmcid.as_deref()
    }

    pub fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }

    pub fn abstract_text(&self) -> Option<&str> {
        self.abstract_text.as_deref()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Whether any availability flag suggests a full-text rendition exists
    pub fn may_have_full_text(&self) -> bool {
        self.availability
            .intersects(Availability::FULL_TEXT | Availability::OPEN_ACCESS | Availability::PDF)
    }

    /// Returns the most portable identifier: DOI, then PMCID, then PMID, then `id`
    pub fn primary_id(&self) -> &str {
        self.doi
            .as_deref()
            .or(self.pmcid.as_deref())
            .or(self.pmid.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Builder for constructing [`ArticleReference`] values
#[derive(Debug, Clone)]
pub struct ReferenceBuilder {
    reference: ArticleReference,
}

impl ReferenceBuilder {
    /// Create a new builder with required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            reference: ArticleReference {
                id: id.into(),
                title: title.into(),
                authors: Vec::new(),
                venue: None,
                published: None,
                availability: Availability::empty(),
                pmid: None,
                pmcid: None,
                doi: None,
                abstract_text: None,
                keywords: Vec::new(),
            },
        }
    }

    /// Set authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set publication venue
    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.reference.venue = non_empty(venue.into());
        self
    }

    /// Set publication date
    pub fn published(mut self, date: NaiveDate) -> Self {
        self.reference.published = Some(date);
        self
    }

    /// Set availability flags
    pub fn availability(mut self, availability: Availability) -> Self {
        self.reference.availability = availability;
        self
    }

    pub fn pmid(mut self, pmid: impl Into<String>) -> Self {
        self.reference.pmid = non_empty(pmid.into());
        self
    }

    pub fn pmcid(mut self, pmcid: impl Into<String>) -> Self {
        self.reference.pmcid = non_empty(pmcid.into());
        self
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.reference.doi = non_empty(doi.into());
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.reference.abstract_text = non_empty(text.into());
        self
    }

    /// Set keywords
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Build the reference
    pub fn build(self) -> ArticleReference {
        self.reference
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Metadata field in which a protein name variant was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Title,
    Keywords,
    Abstract,
}

/// How the name matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// A normalized name variant occurs verbatim
    Exact,
    /// Only token-level similarity was found
    Partial,
}

/// Why a reference received its relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    /// The name variant (or best matching token) that produced the score
    pub variant: String,
    pub field: MatchField,
    pub kind: MatchKind,
}

/// An [`ArticleReference`] scored against a target protein name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedReference {
    reference: ArticleReference,
    score: f64,
    evidence: MatchEvidence,
}

impl RankedReference {
    pub fn new(reference: ArticleReference, score: f64, evidence: MatchEvidence) -> Self {
        Self {
            reference,
            score: score.clamp(0.0, 1.0),
            evidence,
        }
    }

    pub fn reference(&self) -> &ArticleReference {
        &self.reference
    }

    /// Relevance in `[0, 1]`, higher is more relevant
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn evidence(&self) -> &MatchEvidence {
        &self.evidence
    }

    pub fn into_reference(self) -> ArticleReference {
        self.reference
    }
}
