//! Extraction of structured evidence from full-text documents.
//!
//! - [`extract_tables`] turns every table of a JATS document into a grid
//! - [`search_terms`] locates protein names and other terms with context
//! - [`document_text`] gives the plain-text projection both of them work on
//!
//! Nothing here fails outright. Problems are reported as
//! [`ExtractionDiagnostic`](crate::models::ExtractionDiagnostic)s next to
//! whatever could still be extracted.

pub mod markup;
mod tables;
mod terms;

pub use tables::{cell_text, extract_tables};
pub use terms::{project, search_terms, ContextUnit, ContextWindow};

use crate::models::{ExtractionDiagnostic, FullTextDocument};

/// Readable text of a document, with block elements separated by spaces
pub fn document_text(doc: &FullTextDocument) -> (String, Option<ExtractionDiagnostic>) {
    let (flat, diagnostic) = project(doc);
    (flat.text().to_string(), diagnostic)
}
