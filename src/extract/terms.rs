//! Case-insensitive term search over a document's plain-text projection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::extract::markup::{self, FlatText};
use crate::models::{
    DiagnosticKind, DocumentFormat, ExtractionDiagnostic, FullTextDocument, TermMatch, TermSearch,
};

/// Unit in which the context radius is measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextUnit {
    #[default]
    Characters,
    Words,
}

/// How much text to keep on each side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub radius: usize,
    pub unit: ContextUnit,
}

impl ContextWindow {
    pub fn characters(radius: usize) -> Self {
        Self {
            radius,
            unit: ContextUnit::Characters,
        }
    }

    pub fn words(radius: usize) -> Self {
        Self {
            radius,
            unit: ContextUnit::Words,
        }
    }

    /// Character range `[start, end)` of the window around `[offset, offset + len)`.
    ///
    /// Character windows run from `radius` before the match start to `radius`
    /// after it, widened to cover the whole term and clamped to the text.
    fn bounds(&self, chars: &[char], offset: usize, len: usize) -> (usize, usize) {
        let total = chars.len();
        match self.unit {
            ContextUnit::Characters => {
                let start = offset.saturating_sub(self.radius);
                let end = offset
                    .saturating_add(self.radius)
                    .saturating_add(1)
                    .max(offset.saturating_add(len))
                    .min(total);
                (start, end)
            }
            ContextUnit::Words => {
                let start = words_before(chars, offset, self.radius);
                let end = words_after(chars, offset.saturating_add(len), self.radius);
                (start, end)
            }
        }
    }
}

/// Start of the window holding the word around `offset` plus `count` earlier words
fn words_before(chars: &[char], offset: usize, count: usize) -> usize {
    let mut i = offset;
    while i > 0 && !chars[i - 1].is_whitespace() {
        i -= 1;
    }
    for _ in 0..count {
        while i > 0 && chars[i - 1].is_whitespace() {
            i -= 1;
        }
        if i == 0 {
            break;
        }
        while i > 0 && !chars[i - 1].is_whitespace() {
            i -= 1;
        }
    }
    i
}

/// End of the window holding the word around `end` plus `count` later words
fn words_after(chars: &[char], end: usize, count: usize) -> usize {
    let total = chars.len();
    let mut i = end.min(total);
    while i < total && !chars[i].is_whitespace() {
        i += 1;
    }
    for _ in 0..count {
        while i < total && chars[i].is_whitespace() {
            i += 1;
        }
        if i == total {
            break;
        }
        while i < total && !chars[i].is_whitespace() {
            i += 1;
        }
    }
    i
}

/// Lowercase one character, keeping it when lowercasing would change the length
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Plain-text projection of a document, plus any warning about how it was built
pub fn project(doc: &FullTextDocument) -> (FlatText, Option<ExtractionDiagnostic>) {
    match doc.format() {
        DocumentFormat::StructuredMarkup => match markup::parse(doc.content(), 0) {
            Ok(root) => (markup::flatten(&root), None),
            Err(err) => {
                tracing::warn!(
                    "Markup of {} does not parse, falling back to tag stripping: {}",
                    doc.reference_id(),
                    err
                );
                (
                    markup::strip_tags(doc.content()),
                    Some(ExtractionDiagnostic::new(
                        DiagnosticKind::MalformedMarkup,
                        format!("markup is not well formed ({}); positions map to stripped text only", err),
                    )),
                )
            }
        },
        DocumentFormat::PlainText => (FlatText::plain(doc.content()), None),
        DocumentFormat::Unavailable => (FlatText::default(), None),
    }
}

/// Find every occurrence of every term.
///
/// Matches are case-insensitive and may overlap. The result is ordered by
/// offset, then term. Blank terms are skipped with a diagnostic.
pub fn search_terms<S: AsRef<str>>(
    doc: &FullTextDocument,
    terms: &[S],
    window: ContextWindow,
) -> TermSearch {
    let mut result = TermSearch::default();

    if !doc.is_available() {
        result.diagnostics.push(ExtractionDiagnostic::new(
            DiagnosticKind::UnsupportedFormat,
            "no full text is available",
        ));
        return result;
    }

    let mut unique = BTreeSet::new();
    for term in terms {
        let term = term.as_ref().trim();
        if term.is_empty() {
            result
                .diagnostics
                .push(ExtractionDiagnostic::new(DiagnosticKind::EmptyTerm, "blank term ignored"));
        } else {
            unique.insert(term.to_string());
        }
    }
    if unique.is_empty() {
        return result;
    }

    let (flat, diagnostic) = project(doc);
    result.diagnostics.extend(diagnostic);

    let chars: Vec<char> = flat.text().chars().collect();
    let folded: Vec<char> = chars.iter().copied().map(fold).collect();

    for term in &unique {
        let needle: Vec<char> = term.chars().map(fold).collect();
        if needle.len() > folded.len() {
            continue;
        }
        for offset in 0..=(folded.len() - needle.len()) {
            if folded[offset..offset + needle.len()] != needle[..] {
                continue;
            }
            let (start, end) = window.bounds(&chars, offset, needle.len());
            let span = flat.locate(offset);
            result.matches.push(TermMatch {
                term: term.clone(),
                offset,
                context: chars[start..end].iter().collect(),
                context_start: start,
                source_offset: span.map(|s| s.source_offset),
                element: span.map(|s| s.element.clone()),
            });
        }
    }

    result
        .matches
        .sort_by(|a, b| a.offset.cmp(&b.offset).then_with(|| a.term.cmp(&b.term)));

    tracing::debug!(
        "Found {} matches for {} terms in {}",
        result.matches.len(),
        unique.len(),
        doc.reference_id()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> FullTextDocument {
        FullTextDocument::new("DOC", DocumentFormat::PlainText, text)
    }

    #[test]
    fn test_single_match_with_clamped_window() {
        let mut text = "x".repeat(120);
        text.push_str("mCherry");
        text.push_str(&"y".repeat(30));

        let search = search_terms(&plain(&text), &["mCherry"], ContextWindow::characters(10));

        assert_eq!(search.matches.len(), 1);
        let m = &search.matches[0];
        assert_eq!(m.offset, 120);
        assert!(m.context.chars().count() <= 21);
        assert_eq!(m.context_start, 110);
        assert!(m.context[m.relative_offset()..].starts_with("mCherry"));
    }

    #[test]
    fn test_window_clamped_at_document_start() {
        let search = search_terms(&plain("GFP is green"), &["gfp"], ContextWindow::characters(5));
        let m = &search.matches[0];
        assert_eq!(m.offset, 0);
        assert_eq!(m.context, "GFP is");
        assert_eq!(m.term, "gfp");
    }

    #[test]
    fn test_huge_radius_spans_whole_document() {
        for window in [ContextWindow::characters(usize::MAX), ContextWindow::words(usize::MAX)] {
            let search = search_terms(&plain("GFP is green"), &["green"], window);
            assert_eq!(search.matches[0].offset, 7);
            assert_eq!(search.matches[0].context, "GFP is green");
            assert_eq!(search.matches[0].context_start, 0);
        }
    }

    #[test]
    fn test_window_extends_to_cover_long_term() {
        let search = search_terms(
            &plain("the photostability assay"),
            &["photostability"],
            ContextWindow::characters(2),
        );
        assert_eq!(search.matches[0].context, "e photostability");
    }

    #[test]
    fn test_overlapping_and_nested_terms_are_all_reported() {
        let search = search_terms(
            &plain("EGFP and GFP"),
            &["GFP", "EGFP", "egfp"],
            ContextWindow::characters(3),
        );
        let found: Vec<(usize, &str)> =
            search.matches.iter().map(|m| (m.offset, m.term.as_str())).collect();

        assert_eq!(found, vec![(0, "EGFP"), (0, "egfp"), (1, "GFP"), (9, "GFP")]);
    }

    #[test]
    fn test_offsets_are_non_decreasing_and_context_contains_term() {
        let text = "mCherry, mOrange and mCherry2 differ from mcherry";
        let search = search_terms(&plain(text), &["mcherry", "orange"], ContextWindow::characters(4));

        assert!(search.matches.windows(2).all(|w| w[0].offset <= w[1].offset));
        for m in &search.matches {
            let at = m.context.chars().skip(m.relative_offset()).take(m.term.chars().count());
            assert!(at.collect::<String>().eq_ignore_ascii_case(&m.term));
        }
        assert_eq!(search.matches.len(), 4);
    }

    #[test]
    fn test_word_window() {
        let search = search_terms(
            &plain("one two three mCherry four five six"),
            &["cherry"],
            ContextWindow::words(2),
        );
        assert_eq!(search.matches[0].context, "two three mCherry four five");
        assert_eq!(search.matches[0].offset, 15);
    }

    #[test]
    fn test_markup_is_flattened_with_element_positions() {
        let xml = "<article><sec><title>Results</title><p>We used <italic>mCherry</italic>.</p></sec>\
                   <table-wrap><table><tr><td>m</td><td>Cherry</td></tr></table></table-wrap></article>";
        let doc = FullTextDocument::new("PMC1", DocumentFormat::StructuredMarkup, xml);
        let search = search_terms(&doc, &["mcherry"], ContextWindow::characters(8));

        // cells do not run together, so only the italic occurrence matches
        assert_eq!(search.matches.len(), 1);
        let m = &search.matches[0];
        assert_eq!(m.offset, "Results We used ".len());
        assert_eq!(m.element.as_deref(), Some("italic"));
        assert!(xml[m.source_offset.unwrap()..].starts_with("mCherry"));
        assert!(search.diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_markup_degrades_with_diagnostic() {
        let doc = FullTextDocument::new(
            "PMC1",
            DocumentFormat::StructuredMarkup,
            "<p>mCherry <b>bright</p>",
        );
        let search = search_terms(&doc, &["mcherry"], ContextWindow::characters(3));

        assert_eq!(search.matches.len(), 1);
        assert_eq!(search.matches[0].element, None);
        assert_eq!(search.diagnostics[0].kind, DiagnosticKind::MalformedMarkup);
    }

    #[test]
    fn test_unavailable_document_has_no_matches() {
        let search = search_terms(
            &FullTextDocument::unavailable("MED:1"),
            &["GFP"],
            ContextWindow::characters(10),
        );
        assert!(search.matches.is_empty());
        assert_eq!(search.diagnostics[0].kind, DiagnosticKind::UnsupportedFormat);
    }

    #[test]
    fn test_blank_terms_are_reported() {
        let search = search_terms(&plain("GFP"), &["  ", "gfp"], ContextWindow::characters(1));
        assert_eq!(search.matches.len(), 1);
        assert_eq!(search.diagnostics[0].kind, DiagnosticKind::EmptyTerm);
    }

    #[test]
    fn test_zero_matches_is_not_an_error() {
        let search = search_terms(&plain("nothing here"), &["mNeonGreen"], ContextWindow::characters(5));
        assert!(search.matches.is_empty());
        assert!(search.diagnostics.is_empty());
    }
}
