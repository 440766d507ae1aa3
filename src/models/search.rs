//! Search request and response models.

use serde::{Deserialize, Serialize};

use crate::models::ArticleReference;
use crate::sources::SourceError;

/// Smallest page size the literature service accepts
pub const MIN_PAGE_SIZE: usize = 1;
/// Largest page size the literature service accepts
pub const MAX_PAGE_SIZE: usize = 1000;
/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Metadata richness requested from the search service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// Identifiers, title, authors, venue, dates, availability
    Lite,
    /// Everything in `Lite` plus abstract and keywords
    #[default]
    Core,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Lite => "lite",
            ResultType::Core => "core",
        }
    }
}

/// Search query parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text or boolean query string
    pub query: String,

    /// Opaque pagination token from a previous page; `None` on the first page
    pub cursor: Option<String>,

    /// Requested page size, clamped to the accepted range when sent
    pub page_size: usize,

    /// Metadata richness
    pub result_type: ResultType,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            cursor: None,
            page_size: DEFAULT_PAGE_SIZE,
            result_type: ResultType::default(),
        }
    }
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the pagination cursor
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Set the page size
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Set the response mode
    pub fn result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    /// Page size clamped to `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// The query string with surrounding whitespace removed, rejecting blanks
    pub fn validated_query(&self) -> Result<&str, SourceError> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            return Err(SourceError::InvalidInput(
                "search query must not be empty".to_string(),
            ));
        }
        Ok(trimmed)
    }

    /// Query for the page after this one
    pub fn next_page(&self, cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..self.clone()
        }
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// References in the order the service returned them
    pub references: Vec<ArticleReference>,

    /// Cursor for the following page; `None` iff this is the last page
    pub next_cursor: Option<String>,

    /// Total number of hits reported by the service
    pub total_hits: Option<u64>,
}

impl SearchPage {
    /// Create a page with no further pages
    pub fn new(references: Vec<ArticleReference>) -> Self {
        Self {
            references,
            next_cursor: None,
            total_hits: None,
        }
    }

    /// Set the next-page cursor
    pub fn next_cursor(mut self, cursor: Option<String>) -> Self {
        self.next_cursor = cursor;
        self
    }

    /// Set total hits
    pub fn total_hits(mut self, total: u64) -> Self {
        self.total_hits = Some(total);
        self
    }
}
