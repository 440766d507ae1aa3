//! Core data models for references, documents and extracted evidence.

mod document;
mod identifier;
mod reference;
mod search;

pub use document::{
    DiagnosticKind, DocumentFormat, ExtractedTable, ExtractionDiagnostic, FullTextDocument,
    TableExtraction, TermMatch, TermSearch,
};
pub use identifier::ArticleId;
pub use reference::{
    ArticleReference, Availability, MatchEvidence, MatchField, MatchKind, RankedReference,
    ReferenceBuilder,
};
pub use search::{
    ResultType, SearchPage, SearchQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
