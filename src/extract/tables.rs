//! Table extraction from structured (JATS) markup.
//!
//! Each table is cut out of the raw document and parsed on its own, so a
//! broken table costs only itself: it is skipped with a diagnostic and the
//! remaining tables are still returned. Table indexes count every table in
//! document order, including skipped ones.

use crate::extract::markup::{self, collapse_whitespace, Element, Node};
use crate::models::{
    DiagnosticKind, DocumentFormat, ExtractedTable, ExtractionDiagnostic, FullTextDocument,
    TableExtraction,
};

/// Upper bound on a single cell's column span; larger values are treated as malformed
const MAX_COLSPAN: usize = 256;

/// A raw table fragment located in the source
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Complete { offset: usize, markup: &'a str },
    Unterminated { offset: usize },
}

/// Extract every table from a document.
///
/// Plain-text and unavailable documents yield no tables and one
/// [`DiagnosticKind::UnsupportedFormat`] diagnostic saying why.
pub fn extract_tables(doc: &FullTextDocument) -> TableExtraction {
    match doc.format() {
        DocumentFormat::StructuredMarkup => extract_from_markup(doc.reference_id(), doc.content()),
        DocumentFormat::PlainText => unsupported("tables cannot be recovered from plain text"),
        DocumentFormat::Unavailable => unsupported("no full text is available"),
    }
}

fn unsupported(message: &str) -> TableExtraction {
    TableExtraction {
        tables: Vec::new(),
        diagnostics: vec![ExtractionDiagnostic::new(DiagnosticKind::UnsupportedFormat, message)],
    }
}

fn extract_from_markup(document_id: &str, markup: &str) -> TableExtraction {
    let mut segments = find_segments(markup, "table-wrap");
    if segments.is_empty() {
        segments = find_segments(markup, "table");
    }

    let mut extraction = TableExtraction::default();
    for (index, segment) in segments.into_iter().enumerate() {
        match segment {
            Segment::Unterminated { offset } => {
                tracing::warn!("Table {} at byte {} is never closed, skipping", index + 1, offset);
                extraction.diagnostics.push(ExtractionDiagnostic::for_table(
                    index,
                    DiagnosticKind::UnterminatedTable,
                    format!("table starting at byte {} is never closed", offset),
                ));
            }
            Segment::Complete { offset, markup } => match parse_table(document_id, index, markup, offset) {
                Ok(table) => extraction.tables.push(table),
                Err(diagnostic) => {
                    tracing::warn!("Skipping table {}: {}", index + 1, diagnostic.message);
                    extraction.diagnostics.push(diagnostic);
                }
            },
        }
    }

    tracing::debug!(
        "Extracted {} tables from {} ({} skipped)",
        extraction.tables.len(),
        document_id,
        extraction.diagnostics.len()
    );
    extraction
}

/// Find `<name ...>` at or after `from`, not matching longer names sharing the prefix
fn find_tag(haystack: &str, pattern: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    while let Some(found) = haystack.get(cursor..).and_then(|rest| rest.find(pattern)) {
        let at = cursor + found;
        let boundary = haystack[at + pattern.len()..].chars().next();
        match boundary {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => return Some(at),
            None => return None,
            _ => cursor = at + pattern.len(),
        }
    }
    None
}

/// Byte index just past the `>` closing the tag that starts at `at`
fn tag_end(haystack: &str, at: usize) -> Option<usize> {
    haystack[at..].find('>').map(|i| at + i + 1)
}

/// Cut the document into top-level `name` fragments, tracking nesting depth
fn find_segments<'a>(xml: &'a str, name: &str) -> Vec<Segment<'a>> {
    let open = format!("<{}", name);
    let close = format!("</{}", name);
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_tag(xml, &open, pos) {
        let Some(start_end) = tag_end(xml, start) else {
            segments.push(Segment::Unterminated { offset: start });
            break;
        };
        if xml[..start_end].ends_with("/>") {
            segments.push(Segment::Complete {
                offset: start,
                markup: &xml[start..start_end],
            });
            pos = start_end;
            continue;
        }

        let mut depth = 1usize;
        let mut cursor = start_end;
        let end = loop {
            let next_open = find_tag(xml, &open, cursor);
            let Some(next_close) = find_tag(xml, &close, cursor) else {
                break None;
            };
            match next_open {
                Some(o) if o < next_close => {
                    let Some(o_end) = tag_end(xml, o) else {
                        break None;
                    };
                    if !xml[..o_end].ends_with("/>") {
                        depth += 1;
                    }
                    cursor = o_end;
                }
                _ => {
                    let close_end = tag_end(xml, next_close).unwrap_or(xml.len());
                    depth -= 1;
                    cursor = close_end;
                    if depth == 0 {
                        break Some(close_end);
                    }
                }
            }
        };

        match end {
            Some(end) => {
                segments.push(Segment::Complete {
                    offset: start,
                    markup: &xml[start..end],
                });
                pos = end;
            }
            None => {
                segments.push(Segment::Unterminated { offset: start });
                pos = start_end;
            }
        }
    }

    segments
}

fn parse_table(
    document_id: &str,
    index: usize,
    fragment: &str,
    offset: usize,
) -> Result<ExtractedTable, ExtractionDiagnostic> {
    let root = markup::parse(fragment, offset).map_err(|e| {
        ExtractionDiagnostic::for_table(index, DiagnosticKind::MalformedTable, e.to_string())
    })?;

    let Some(wrapper) = root.elements().next() else {
        return Err(ExtractionDiagnostic::for_table(
            index,
            DiagnosticKind::MissingTableBody,
            "table element is empty",
        ));
    };

    let body = if wrapper.name == "table" {
        Some(wrapper)
    } else {
        wrapper.find("table")
    };
    let Some(body) = body else {
        return Err(ExtractionDiagnostic::for_table(
            index,
            DiagnosticKind::MissingTableBody,
            "table has no tabular body (image-only or external table)",
        ));
    };

    let (rows, header_rows) = build_grid(body, index)?;

    let label = wrapper.child("label").map(cell_text);
    let caption = wrapper
        .child("caption")
        .or_else(|| body.child("caption"))
        .map(Element::text);
    let footnote = wrapper.child("table-wrap-foot").map(footnote_text);

    Ok(ExtractedTable::new(document_id, index, rows, header_rows)
        .with_label(label)
        .with_caption(caption)
        .with_footnote(footnote))
}

/// Footnotes one per line
fn footnote_text(foot: &Element) -> String {
    let mut notes = Vec::new();
    foot.find_all("fn", &mut notes);
    if notes.is_empty() {
        return foot.text();
    }
    notes
        .into_iter()
        .map(Element::text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rows in document order, each flagged as header or not
fn collect_rows(table: &Element) -> Vec<(&Element, bool)> {
    let mut rows = Vec::new();
    for child in table.elements() {
        match child.name.as_str() {
            "thead" => rows.extend(child.elements().filter(|e| e.name == "tr").map(|tr| (tr, true))),
            "tbody" | "tfoot" => {
                rows.extend(child.elements().filter(|e| e.name == "tr").map(|tr| (tr, false)))
            }
            "tr" => rows.push((child, false)),
            _ => {}
        }
    }

    // Without a thead, a leading all-th row is the header
    if !rows.iter().any(|(_, header)| *header) {
        if let Some((first, header)) = rows.first_mut() {
            let mut cells = first.elements().filter(|e| e.name == "td" || e.name == "th").peekable();
            if cells.peek().is_some() && cells.all(|c| c.name == "th") {
                *header = true;
            }
        }
    }
    rows
}

fn span_attr(cell: &Element, name: &str, index: usize) -> Result<usize, ExtractionDiagnostic> {
    match cell.attr(name).map(str::trim) {
        None | Some("") => Ok(1),
        Some(raw) => match raw.parse::<usize>() {
            Ok(0) => Ok(1),
            Ok(n) if n <= MAX_COLSPAN => Ok(n),
            _ => Err(ExtractionDiagnostic::for_table(
                index,
                DiagnosticKind::MalformedTable,
                format!("invalid {} value '{}'", name, raw),
            )),
        },
    }
}

/// Lay cells out on a span-aware grid.
///
/// Row spans repeat the cell text downward; column spans pad with empty cells.
fn build_grid(
    table: &Element,
    index: usize,
) -> Result<(Vec<Vec<String>>, usize), ExtractionDiagnostic> {
    let rows = collect_rows(table);
    let header_rows = rows.iter().take_while(|(_, header)| *header).count();
    let mut grid: Vec<Vec<Option<String>>> = vec![Vec::new(); rows.len()];

    for (r, (row, _)) in rows.iter().enumerate() {
        let mut c = 0;
        for cell in row.elements().filter(|e| e.name == "td" || e.name == "th") {
            while grid[r].get(c).is_some_and(Option::is_some) {
                c += 1;
            }

            let text = cell_text(cell);
            let rowspan = span_attr(cell, "rowspan", index)?.min(rows.len() - r);
            let colspan = span_attr(cell, "colspan", index)?;

            for grid_row in grid.iter_mut().skip(r).take(rowspan) {
                if grid_row.len() < c + colspan {
                    grid_row.resize(c + colspan, None);
                }
                for (dc, slot) in grid_row[c..c + colspan].iter_mut().enumerate() {
                    *slot = Some(if dc == 0 { text.clone() } else { String::new() });
                }
            }
            c += colspan;
        }
    }

    let rows = grid
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect();
    Ok((rows, header_rows))
}

/// Flattened cell text.
///
/// Citation links are dropped, one- or two-letter superscripts and subscripts
/// become spaced footnote markers, other superscripts are written `^x` and
/// subscripts `_x`.
pub fn cell_text(cell: &Element) -> String {
    let mut out = String::new();
    inline_text(cell, &mut out);
    collapse_whitespace(&out)
}

fn inline_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text { text, .. } => out.push_str(text),
            Node::Element(child) => match child.name.as_str() {
                "xref" => {}
                "sup" | "sub" => {
                    if child.contains("xref") {
                        continue;
                    }
                    let mut inner = String::new();
                    inline_text(child, &mut inner);
                    let inner = collapse_whitespace(&inner);
                    if inner.is_empty() {
                        continue;
                    }
                    let count = inner.chars().count();
                    if count <= 2 && inner.chars().all(char::is_alphabetic) {
                        out.push(' ');
                        out.push_str(&inner);
                    } else {
                        out.push(if child.name == "sup" { '^' } else { '_' });
                        out.push_str(&inner);
                    }
                }
                "break" | "br" => out.push(' '),
                _ => inline_text(child, out),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markup_doc(body: &str) -> FullTextDocument {
        FullTextDocument::new("PMC1", DocumentFormat::StructuredMarkup, body)
    }

    const SIMPLE_TABLE: &str = r#"<table-wrap id="t1">
  <label>Table 1</label>
  <caption><title>Photophysical properties</title></caption>
  <table>
    <thead><tr><th>Protein</th><th>QY</th></tr></thead>
    <tbody><tr><td>StayGold</td><td>0.93</td></tr></tbody>
  </table>
  <table-wrap-foot><fn><p>QY, quantum yield.</p></fn></table-wrap-foot>
</table-wrap>"#;

    #[test]
    fn test_simple_table() {
        let extraction = extract_tables(&markup_doc(SIMPLE_TABLE));
        assert!(extraction.is_complete());
        assert_eq!(extraction.tables.len(), 1);

        let table = &extraction.tables[0];
        assert_eq!(table.label(), Some("Table 1"));
        assert_eq!(table.caption(), Some("Photophysical properties"));
        assert_eq!(table.footnote(), Some("QY, quantum yield."));
        assert_eq!(table.header_rows(), 1);
        assert_eq!(table.rows()[1], vec!["StayGold", "0.93"]);
    }

    #[test]
    fn test_labelled_footnotes_render_as_legend_bullets() {
        let extraction = extract_tables(&markup_doc(
            "<table-wrap><table><tr><td>mScarlet</td><td>0.70<sup>a</sup></td></tr></table>\
             <table-wrap-foot><fn><label>a</label><p>Measured at pH 7.4.</p></fn>\
             <fn><label>b</label><p>Relative to EGFP.</p></fn></table-wrap-foot></table-wrap>",
        ));

        let markdown = extraction.tables[0].to_markdown();
        assert!(markdown.contains("**Legend:**\n- a: Measured at pH 7.4.\n- b: Relative to EGFP."));
    }

    #[test]
    fn test_missing_caption_and_footnote() {
        let extraction = extract_tables(&markup_doc(
            "<table-wrap><table><tr><td>a</td></tr></table></table-wrap>",
        ));
        let table = &extraction.tables[0];
        assert_eq!(table.caption(), None);
        assert_eq!(table.footnote(), None);
        assert_eq!(table.header_rows(), 0);
    }

    #[test]
    fn test_row_and_column_spans() {
        let extraction = extract_tables(&markup_doc(
            r#"<table-wrap><table>
                <thead>
                  <tr><th rowspan="2">Protein</th><th colspan="2">Spectra</th></tr>
                  <tr><th>Ex</th><th>Em</th></tr>
                </thead>
                <tbody><tr><td>mCherry</td><td>587</td><td>610</td></tr></tbody>
              </table></table-wrap>"#,
        ));
        let table = &extraction.tables[0];

        assert_eq!(table.rows()[0], vec!["Protein", "Spectra", ""]);
        assert_eq!(table.rows()[1], vec!["Protein", "Ex", "Em"]);
        assert_eq!(table.column_headers(), vec!["Protein", "Spectra > Ex", "Spectra > Em"]);
        assert_eq!(table.body_rows()[0], vec!["mCherry", "587", "610"]);
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let extraction = extract_tables(&markup_doc(
            "<table-wrap><table><tr><td>a</td><td>b</td><td>c</td></tr><tr><td>d</td></tr></table></table-wrap>",
        ));
        let table = &extraction.tables[0];
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows()[1], vec!["d", "", ""]);
    }

    #[test]
    fn test_cell_text_rules() {
        let root = markup::parse(
            "<td>Ex<sub>max</sub> 10<sup>5</sup> value<sup>a</sup> ref<xref>12</xref><sup><xref>3</xref></sup>\u{2009}nm</td>",
            0,
        )
        .unwrap();
        let cell = root.child("td").unwrap();
        assert_eq!(cell_text(cell), "Ex_max 10^5 value a ref nm");
    }

    #[test]
    fn test_image_only_table_is_reported() {
        let extraction = extract_tables(&markup_doc(
            r#"<table-wrap><label>Table 1</label><graphic href="t1.jpg"/></table-wrap>"#,
        ));
        assert!(extraction.tables.is_empty());
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::MissingTableBody);
        assert_eq!(extraction.diagnostics[0].table_index, Some(0));
    }

    #[test]
    fn test_unterminated_table_does_not_hide_later_tables() {
        let doc = markup_doc(
            "<body><table-wrap><table><tr><td>lost</td></tr></table>\
             <table-wrap><table><tr><td>kept</td></tr></table></table-wrap></body>",
        );
        let extraction = extract_tables(&doc);

        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::UnterminatedTable);
        assert_eq!(extraction.tables.len(), 1);
        assert_eq!(extraction.tables[0].index(), 1);
        assert_eq!(extraction.tables[0].rows()[0], vec!["kept"]);
    }

    #[test]
    fn test_table_wrap_foot_is_not_a_table_start() {
        let segments = find_segments(SIMPLE_TABLE, "table-wrap");
        assert_eq!(segments.len(), 1);
        assert!(matches!(segments[0], Segment::Complete { offset: 0, .. }));
    }

    #[test]
    fn test_bare_tables_without_wrappers() {
        let extraction = extract_tables(&markup_doc(
            "<body><table><caption>Brightness</caption><tr><th>FP</th></tr><tr><td>EGFP</td></tr></table></body>",
        ));
        let table = &extraction.tables[0];
        assert_eq!(table.caption(), Some("Brightness"));
        assert_eq!(table.header_rows(), 1);
    }

    #[test]
    fn test_plain_text_yields_diagnostic_not_tables() {
        let doc = FullTextDocument::new("DOI", DocumentFormat::PlainText, "Table 1 QY 0.93");
        let extraction = extract_tables(&doc);
        assert!(extraction.tables.is_empty());
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::UnsupportedFormat);
    }
}
