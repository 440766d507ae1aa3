//! Full-text documents and the evidence extracted from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a document's content should be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// JATS (or other XML) preserving sections and tables
    StructuredMarkup,
    /// Unstructured text, e.g. recovered from a PDF
    PlainText,
    /// No full text could be obtained
    Unavailable,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::StructuredMarkup => "structured_markup",
            DocumentFormat::PlainText => "plain_text",
            DocumentFormat::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The body of an article in whatever format could be retrieved.
///
/// Extractors only ever borrow a document, so one document can be shared by
/// several concurrent extractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextDocument {
    reference_id: String,
    format: DocumentFormat,
    content: String,
    origin: Option<String>,
}

impl FullTextDocument {
    pub fn new(
        reference_id: impl Into<String>,
        format: DocumentFormat,
        content: impl Into<String>,
    ) -> Self {
        let content = match format {
            DocumentFormat::Unavailable => String::new(),
            _ => content.into(),
        };
        Self {
            reference_id: reference_id.into(),
            format,
            content,
            origin: None,
        }
    }

    /// A placeholder for a reference without retrievable full text
    pub fn unavailable(reference_id: impl Into<String>) -> Self {
        Self::new(reference_id, DocumentFormat::Unavailable, "")
    }

    /// Record which service or URL the content came from
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Identifier of the [`ArticleReference`](crate::models::ArticleReference) this came from
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.format != DocumentFormat::Unavailable
    }
}

/// A table recovered from structured markup.
///
/// The grid is always rectangular: construction pads short rows with empty
/// cells up to the widest row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    document_id: String,
    index: usize,
    label: Option<String>,
    caption: Option<String>,
    footnote: Option<String>,
    header_rows: usize,
    column_count: usize,
    rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    /// Build a table, right-padding ragged rows to the maximum width
    pub fn new(
        document_id: impl Into<String>,
        index: usize,
        rows: Vec<Vec<String>>,
        header_rows: usize,
    ) -> Self {
        let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(column_count, String::new());
                row
            })
            .collect::<Vec<_>>();
        let header_rows = header_rows.min(rows.len());

        Self {
            document_id: document_id.into(),
            index,
            label: None,
            caption: None,
            footnote: None,
            header_rows,
            column_count,
            rows,
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label.filter(|s| !s.is_empty());
        self
    }

    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = caption.filter(|s| !s.is_empty());
        self
    }

    pub fn with_footnote(mut self, footnote: Option<String>) -> Self {
        self.footnote = footnote.filter(|s| !s.is_empty());
        self
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Position of the table among all tables in the document
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn footnote(&self) -> Option<&str> {
        self.footnote.as_deref()
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of leading grid rows that came from the table header
    pub fn header_rows(&self) -> usize {
        self.header_rows
    }

    /// The full grid, header rows first
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Grid rows after the header
    pub fn body_rows(&self) -> &[Vec<String>] {
        &self.rows[self.header_rows..]
    }

    /// One header string per column, multi-level headers joined as `"Parent > Child"`.
    ///
    /// Cells left empty by a column span inherit the nearest non-empty cell
    /// to their left in the same header row.
    pub fn column_headers(&self) -> Vec<String> {
        let header = &self.rows[..self.header_rows];
        (0..self.column_count)
            .map(|col| {
                let mut parts: Vec<&str> = Vec::new();
                for row in header {
                    let mut cell = row[col].as_str();
                    if cell.is_empty() {
                        cell = row[..col]
                            .iter()
                            .rev()
                            .map(|c| c.as_str())
                            .find(|c| !c.trim().is_empty())
                            .unwrap_or("");
                    }
                    if !cell.trim().is_empty() && parts.last() != Some(&cell) {
                        parts.push(cell);
                    }
                }
                parts.join(" > ")
            })
            .collect()
    }

    /// Title line combining label and caption, as shown above the table
    pub fn title(&self) -> Option<String> {
        match (&self.label, &self.caption) {
            (Some(label), Some(caption)) => Some(format!("{}: {}", label, caption)),
            (None, Some(caption)) => Some(caption.clone()),
            (Some(label), None) => Some(label.clone()),
            (None, None) => None,
        }
    }

    /// Render as a Markdown table with title and legend
    pub fn to_markdown(&self) -> String {
        let mut lines = Vec::new();

        if let Some(title) = self.title() {
            lines.push(format!("**{}**\n", title));
        }

        if self.header_rows > 0 {
            let headers = self.column_headers();
            lines.push(markdown_row(&headers));
            lines.push(markdown_row(&vec!["---".to_string(); self.column_count]));
        }

        for row in self.body_rows() {
            lines.push(markdown_row(row));
        }

        if let Some(footnote) = &self.footnote {
            lines.push("\n**Legend:**".to_string());
            lines.extend(legend_lines(footnote));
        }

        lines.join("\n")
    }
}

/// Footnotes as bullets, `- a: text` when a note opens with a marker
fn legend_lines(footnote: &str) -> Vec<String> {
    let lines: Vec<String> = footnote
        .lines()
        .flat_map(split_notes)
        .map(|note| match split_marker(note) {
            Some((marker, text)) => format!("- {}: {}", marker, text),
            None => format!("- {}", note),
        })
        .collect();
    if lines.is_empty() {
        vec![footnote.to_string()]
    } else {
        lines
    }
}

/// Notes on one line: inline runs such as "aFirst.bSecond.cThird." when
/// there are more than two markers, semicolon-separated otherwise
fn split_notes(line: &str) -> Vec<&str> {
    let starts = inline_marker_starts(line);
    if starts.len() > 2 {
        let mut notes = Vec::with_capacity(starts.len() + 1);
        let mut bounds = starts;
        if bounds[0] != 0 {
            bounds.insert(0, 0);
        }
        bounds.push(line.len());
        for pair in bounds.windows(2) {
            let note = line[pair[0]..pair[1]].trim().trim_end_matches('.').trim_end();
            if !note.is_empty() {
                notes.push(note);
            }
        }
        return notes;
    }

    line.split(';').map(str::trim).filter(|note| !note.is_empty()).collect()
}

/// Byte positions of a lowercase marker glued to a capitalised note,
/// at the line start or right after a full stop
fn inline_marker_starts(line: &str) -> Vec<usize> {
    let bytes = line.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .filter(|&i| bytes[i].is_ascii_lowercase() && bytes[i + 1].is_ascii_uppercase())
        .filter(|&i| i == 0 || line[..i].trim_end().ends_with('.'))
        .collect()
}

/// Leading one- or two-letter marker and the note text after it
fn split_marker(note: &str) -> Option<(&str, &str)> {
    let len = note.bytes().take_while(u8::is_ascii_lowercase).count();
    if !(1..=2).contains(&len) {
        return None;
    }
    let text = note[len..].trim_start();
    text.starts_with(|c: char| c.is_uppercase() || c.is_ascii_digit())
        .then_some((&note[..len], text))
}

fn markdown_row(cells: &[String]) -> String {
    let escaped: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
    format!("| {} |", escaped.join(" | "))
}

/// One occurrence of a query term in a document's plain-text projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMatch {
    /// The query term as supplied
    pub term: String,

    /// Zero-based character offset of the match in the plain-text projection
    pub offset: usize,

    /// Surrounding text, clamped to the document bounds
    pub context: String,

    /// Character offset of `context` in the plain-text projection
    pub context_start: usize,

    /// Byte offset of the enclosing text in the source markup, when known
    pub source_offset: Option<usize>,

    /// Name of the innermost element enclosing the match, when known
    pub element: Option<String>,
}

impl TermMatch {
    /// Character offset of the match inside `context`
    pub fn relative_offset(&self) -> usize {
        self.offset - self.context_start
    }
}

/// Category of a non-fatal extraction problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The document format does not support this extraction
    UnsupportedFormat,
    /// A table's markup is not well formed
    MalformedTable,
    /// A table wrapper contains no tabular body (e.g. an image-only table)
    MissingTableBody,
    /// A table starts but never ends before the document does
    UnterminatedTable,
    /// The document markup is not well formed; a degraded parse was used
    MalformedMarkup,
    /// A blank query term was ignored
    EmptyTerm,
}

/// A warning attached to a partial result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDiagnostic {
    /// Table position the warning concerns, if any
    pub table_index: Option<usize>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl ExtractionDiagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            table_index: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_table(index: usize, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            table_index: Some(index),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExtractionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_index {
            Some(index) => write!(f, "table {}: {}", index + 1, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Tables extracted from one document, plus what was skipped and why
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableExtraction {
    pub tables: Vec<ExtractedTable>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

impl TableExtraction {
    /// True when nothing was skipped
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Term matches from one document, plus any warnings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermSearch {
    pub matches: Vec<TermMatch>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let table = ExtractedTable::new(
            "PMC1",
            0,
            vec![cells(&["a", "b", "c"]), cells(&["d"]), cells(&[])],
            0,
        );

        assert_eq!(table.column_count(), 3);
        assert!(table.rows().iter().all(|row| row.len() == 3));
        assert_eq!(table.rows()[1], cells(&["d", "", ""]));
    }

    #[test]
    fn test_multi_level_column_headers() {
        let table = ExtractedTable::new(
            "PMC1",
            0,
            vec![
                cells(&["Protein", "Spectra", ""]),
                cells(&["Protein", "Ex (nm)", "Em (nm)"]),
                cells(&["StayGold", "496", "504"]),
            ],
            2,
        );

        assert_eq!(
            table.column_headers(),
            vec!["Protein", "Spectra > Ex (nm)", "Spectra > Em (nm)"]
        );
        assert_eq!(table.body_rows().len(), 1);
    }

    #[test]
    fn test_markdown_rendering() {
        let table = ExtractedTable::new(
            "PMC1",
            0,
            vec![cells(&["Protein", "QY"]), cells(&["StayGold", "0.93"])],
            1,
        )
        .with_label(Some("Table 1".to_string()))
        .with_caption(Some("Photophysical properties".to_string()))
        .with_footnote(Some("QY, quantum yield.".to_string()));

        let markdown = table.to_markdown();
        assert!(markdown.starts_with("**Table 1: Photophysical properties**"));
        assert!(markdown.contains("| Protein | QY |"));
        assert!(markdown.contains("| --- | --- |"));
        assert!(markdown.contains("| StayGold | 0.93 |"));
        assert!(markdown.ends_with("- QY, quantum yield."));
    }

    #[test]
    fn test_markdown_legend_lists_marked_notes() {
        let table = ExtractedTable::new("PMC1", 0, vec![cells(&["mCherry", "0.22"])], 0)
            .with_footnote(Some(
                "aMeasured at pH 7.4.bIn HeLa cells.cFrom ref. 12.\nQY, quantum yield; Ex, excitation"
                    .to_string(),
            ));

        let markdown = table.to_markdown();
        let legend: Vec<&str> = markdown
            .lines()
            .skip_while(|line| *line != "**Legend:**")
            .skip(1)
            .collect();

        assert_eq!(
            legend,
            vec![
                "- a: Measured at pH 7.4",
                "- b: In HeLa cells",
                "- c: From ref. 12",
                "- QY, quantum yield",
                "- Ex, excitation",
            ]
        );
    }

    #[test]
    fn test_legend_markers_before_semicolon_notes() {
        let lines = legend_lines("a Measured in PBS; b 2 replicates; ex, excitation");
        assert_eq!(lines, vec!["- a: Measured in PBS", "- b: 2 replicates", "- ex, excitation"]);
    }

    #[test]
    fn test_unavailable_document_drops_content() {
        let doc = FullTextDocument::new("MED:1", DocumentFormat::Unavailable, "ignored");
        assert_eq!(doc.content(), "");
        assert!(!doc.is_available());
    }
}
